//! # Fuzzy Ingredient Matcher
//!
//! Resolves noisy recognized text to a catalog ingredient and extracts a
//! quantity from the digit stream.
//!
//! Matching is a hybrid of token voting over a precomputed [`KeywordIndex`]
//! and an OCR-tolerant substring edit distance against each ingredient's full
//! normalized name. When voting yields nothing acceptable, a full scan over the
//! catalog by distance alone is used instead.

use crate::catalog::Ingredient;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Generic flavour modifiers that never identify an ingredient on their own
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "とくせん",
    "ワカクサ",
    "おいしい",
    "めざまし",
    "ピュア",
    "ピュアな",
    "あったか",
    "あんみん",
    "リラックス",
    "モーモー",
    "ほっこり",
    "あじわい",
    "げきから",
];

/// Canonical multiplier symbol produced by [`normalize`]
pub const MULTIPLIER: char = 'x';

const MIN_TOKEN_CHARS: usize = 2;

lazy_static! {
    /// Runs of characters outside the kanji, kana and ASCII alphanumeric ranges
    static ref NON_WORD_RUN: Regex =
        Regex::new(r"[^一-龠ぁ-ゔァ-ヴーa-zA-Z0-9]+").expect("valid token separator regex");
    /// Multiplier glyph followed by one to three digits, e.g. `×12`
    static ref MULTIPLIER_QTY: Regex =
        Regex::new(r"(?i)[x×✕]\s*([0-9]{1,3})").expect("valid multiplier regex");
    static ref DIGIT_RUN: Regex = Regex::new(r"[0-9]+").expect("valid digit run regex");
}

fn is_multiplier_glyph(c: char) -> bool {
    matches!(c, '×' | '✕' | 'x' | 'X')
}

fn is_bracket(c: char) -> bool {
    matches!(c, '(' | ')' | '（' | '）' | '[' | ']' | '【' | '】')
}

/// Strip all whitespace (including U+3000), unify multiplier glyphs to `x`
/// and drop bracket characters.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !is_bracket(*c))
        .map(|c| if is_multiplier_glyph(c) { MULTIPLIER } else { c })
        .collect()
}

fn split_words(text: &str) -> Vec<String> {
    let spaced: String = text
        .chars()
        .map(|c| if is_multiplier_glyph(c) { ' ' } else { c })
        .collect();
    NON_WORD_RUN
        .split(&spaced)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split recognized text into normalized tokens of at least two characters
pub fn tokenize(text: &str) -> Vec<String> {
    split_words(text)
        .iter()
        .map(|word| normalize(word))
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// Levenshtein distance over Unicode scalar values (no transposition)
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    edit_distance_chars(&a, &b)
}

fn edit_distance_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Smallest edit distance between `key` and any equal-length window of `text`.
///
/// Returns `None` (infinite distance) when either side is empty or `text` is
/// shorter than `key`.
pub fn min_substring_distance(text: &str, key: &str) -> Option<usize> {
    let text: Vec<char> = text.chars().collect();
    let key: Vec<char> = key.chars().collect();
    if text.is_empty() || key.is_empty() || text.len() < key.len() {
        return None;
    }

    let mut best = usize::MAX;
    for window in text.windows(key.len()) {
        best = best.min(edit_distance_chars(window, &key));
        if best == 0 {
            break;
        }
    }
    Some(best)
}

fn distance_rank(distance: Option<usize>) -> usize {
    distance.unwrap_or(usize::MAX)
}

/// Immutable token -> ingredient lookup built once per catalog
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    keywords: HashMap<String, BTreeSet<usize>>,
    full_keys: Vec<String>,
}

impl KeywordIndex {
    /// Ingredient ids a normalized token may indicate
    pub fn lookup(&self, token: &str) -> Option<&BTreeSet<usize>> {
        self.keywords.get(token)
    }

    /// Normalized full name of an ingredient
    pub fn full_key(&self, id: usize) -> Option<&str> {
        self.full_keys.get(id).map(String::as_str)
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    pub fn ingredient_count(&self) -> usize {
        self.full_keys.len()
    }

    fn add(&mut self, key: &str, id: usize) {
        let normalized = normalize(key);
        if normalized.chars().count() < MIN_TOKEN_CHARS {
            return;
        }
        self.keywords.entry(normalized).or_default().insert(id);
    }
}

/// Build the keyword index for a catalog.
///
/// Every alias is indexed whole, the name contributes each of its words
/// (except stopwords) and the full name itself.
pub fn build_index(ingredients: &[Ingredient], stopwords: &[String]) -> KeywordIndex {
    let mut index = KeywordIndex {
        keywords: HashMap::new(),
        full_keys: ingredients.iter().map(|i| normalize(&i.name)).collect(),
    };

    for ingredient in ingredients {
        for alias in &ingredient.aliases {
            index.add(alias, ingredient.id);
        }
        for word in split_words(&ingredient.name) {
            if stopwords.iter().any(|s| *s == word) {
                continue;
            }
            index.add(&word, ingredient.id);
        }
        index.add(&ingredient.name, ingredient.id);
    }

    index
}

/// Resolved ingredient for one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngredientMatch {
    pub id: usize,
    /// Token votes; 0 when found by the full scan
    pub votes: usize,
    pub distance: usize,
}

/// Resolve tokens and compact (normalized) text to an ingredient.
///
/// The candidate with the most votes wins, ties going to the smaller distance
/// and then to the first candidate voted for. It is accepted when its distance
/// is within `max_distance`; otherwise every ingredient is scanned by distance.
pub fn match_ingredient(
    index: &KeywordIndex,
    tokens: &[String],
    compact_text: &str,
    max_distance: usize,
) -> Option<IngredientMatch> {
    let mut votes: Vec<(usize, usize)> = Vec::new();
    for token in tokens {
        let Some(ids) = index.lookup(&normalize(token)) else {
            continue;
        };
        for id in ids {
            match votes.iter_mut().find(|(candidate, _)| candidate == id) {
                Some((_, count)) => *count += 1,
                None => votes.push((*id, 1)),
            }
        }
    }

    let mut best: Option<(usize, usize, Option<usize>)> = None;
    for (id, count) in votes {
        let distance = index
            .full_key(id)
            .and_then(|key| min_substring_distance(compact_text, key));
        let better = match best {
            None => true,
            Some((_, best_votes, best_distance)) => {
                count > best_votes
                    || (count == best_votes
                        && distance_rank(distance) < distance_rank(best_distance))
            }
        };
        if better {
            best = Some((id, count, distance));
        }
    }

    if let Some((id, votes, Some(distance))) = best {
        if distance <= max_distance {
            return Some(IngredientMatch {
                id,
                votes,
                distance,
            });
        }
    }

    full_scan(index, compact_text, max_distance)
}

fn full_scan(index: &KeywordIndex, compact_text: &str, max_distance: usize) -> Option<IngredientMatch> {
    let mut pick: Option<(usize, usize)> = None;
    for (id, key) in index.full_keys.iter().enumerate() {
        let Some(distance) = min_substring_distance(compact_text, key) else {
            continue;
        };
        if pick.map_or(true, |(_, best)| distance < best) {
            pick = Some((id, distance));
            if distance == 0 {
                break;
            }
        }
    }

    pick.filter(|(_, distance)| *distance <= max_distance)
        .map(|(id, distance)| IngredientMatch {
            id,
            votes: 0,
            distance,
        })
}

/// Replace full-width digits with ASCII digits
pub fn to_half_width_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_ascii_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Longest standalone run of one to three digits; the first one wins among equals
fn longest_short_digit_run(text: &str) -> Option<u32> {
    let mut best: Option<&str> = None;
    for run in DIGIT_RUN.find_iter(text) {
        let before = text[..run.start()].chars().next_back();
        let after = text[run.end()..].chars().next();
        if before.is_some_and(is_ascii_word) || after.is_some_and(is_ascii_word) {
            continue;
        }
        if run.as_str().len() > 3 {
            continue;
        }
        if best.map_or(true, |b| run.as_str().len() > b.len()) {
            best = Some(run.as_str());
        }
    }
    best.and_then(|digits| digits.parse().ok())
}

/// Best-guess quantity from the digit pass, falling back to the name pass.
///
/// A multiplier glyph followed by digits (`×12`) is preferred, first in the
/// digit text and then in the name text. Otherwise the longest standalone run
/// of 1-3 digits in the digit text is used. `0` means no quantity was found.
pub fn extract_quantity(digit_text: &str, name_text: &str) -> u32 {
    let digits = collapse_spaces(&to_half_width_digits(digit_text));
    let name = collapse_spaces(&to_half_width_digits(name_text));

    let multiplied = MULTIPLIER_QTY
        .captures(&digits)
        .or_else(|| MULTIPLIER_QTY.captures(&name))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());

    multiplied
        .or_else(|| longest_short_digit_run(&digits))
        .unwrap_or(0)
}

/// Everything the matcher derives from one tile's raw text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileAnalysis {
    pub tokens: Vec<String>,
    pub compact_name: String,
    pub matched: Option<IngredientMatch>,
    pub quantity: u32,
}

/// Tokenize, match and extract a quantity from one tile's raw text pair
pub fn analyze_tile(
    index: &KeywordIndex,
    raw_name: &str,
    raw_digit: &str,
    max_distance: usize,
) -> TileAnalysis {
    let tokens = tokenize(raw_name);
    let compact_name = normalize(raw_name);
    let matched = match_ingredient(index, &tokens, &compact_name, max_distance);
    let quantity = extract_quantity(raw_digit, raw_name);
    TileAnalysis {
        tokens,
        compact_name,
        matched,
        quantity,
    }
}
