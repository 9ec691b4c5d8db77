//! # Result Reconciliation
//!
//! Partitions a batch of per-tile recognition results into stock writes that
//! are applied immediately, rows presented for confirmation, and empty cells.
//!
//! Decision order:
//! 1. A result with a match within `auto_apply_distance_max` and a quantity in
//!    `1..auto_confirm_quantity_min` is auto-applied. Several such tiles for the
//!    same ingredient collapse to the lowest distance, first seen on ties.
//! 2. Remaining matched results with a quantity are grouped by ingredient and
//!    only the lowest-distance tile of each group is kept (first seen on ties).
//!    The other members of the group are dropped.
//! 3. Remaining matched results with an implausibly large quantity are kept.
//! 4. Anything left with either a match or a quantity is kept; results with
//!    neither are empty cells.

use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::MatcherConfig;
use crate::geometry::TileRect;
use crate::matcher::IngredientMatch;
use crate::ocr_errors::OcrError;
use crate::preprocessing::Thumbnail;
use crate::stock::StockWrite;

/// Best accepted recognition of one tile
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionResult {
    pub tile: TileRect,
    pub raw_name_text: String,
    pub raw_digit_text: String,
    pub tokens: Vec<String>,
    pub matched: Option<IngredientMatch>,
    /// 0 means no usable quantity was found
    pub quantity: u32,
    /// Recognition scale of the kept attempt
    pub scale: f32,
    /// Number of scales tried for this tile
    pub attempts: usize,
    pub thumbnail: Option<Thumbnail>,
}

impl RecognitionResult {
    pub fn match_distance(&self) -> Option<usize> {
        self.matched.map(|m| m.distance)
    }

    pub fn ingredient_id(&self) -> Option<usize> {
        self.matched.map(|m| m.id)
    }

    pub fn has_quantity(&self) -> bool {
        self.quantity > 0
    }

    /// Whether this result may be written to stock without review
    pub fn is_auto_apply(&self, config: &MatcherConfig) -> bool {
        self.matched
            .is_some_and(|m| m.distance <= config.auto_apply_distance_max)
            && self.has_quantity()
            && self.quantity < config.auto_confirm_quantity_min
    }

    /// Ordering key used to pick between attempts at different scales
    fn rank(&self) -> (bool, bool, std::cmp::Reverse<usize>) {
        (
            self.matched.is_some(),
            self.has_quantity(),
            std::cmp::Reverse(self.match_distance().unwrap_or(usize::MAX)),
        )
    }

    /// Whether this attempt should replace `other` for the same tile
    pub fn outranks(&self, other: &RecognitionResult) -> bool {
        self.rank() > other.rank()
    }
}

/// Why a row needs review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmReason {
    /// Quantity at or above the implausibility ceiling
    LargeQuantity,
    /// Match found but outside the auto-apply distance
    WeakMatch,
    /// Quantity found but no ingredient matched
    NoMatch,
    /// Ingredient matched but no quantity found
    NoQuantity,
}

impl ConfirmReason {
    fn of(result: &RecognitionResult, config: &MatcherConfig) -> Self {
        match result.matched {
            None => ConfirmReason::NoMatch,
            Some(_) if result.quantity >= config.auto_confirm_quantity_min => {
                ConfirmReason::LargeQuantity
            }
            Some(_) if !result.has_quantity() => ConfirmReason::NoQuantity,
            Some(_) => ConfirmReason::WeakMatch,
        }
    }
}

/// One row of the confirmation payload
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRow {
    pub tile: TileRect,
    pub suggested_ingredient: Option<String>,
    pub suggested_quantity: u32,
    pub match_distance: Option<usize>,
    pub reason: ConfirmReason,
    /// Ingredient is fixed (close enough to auto-apply); only the quantity may change
    pub locked: bool,
    /// Tiles that detected this ingredient and were folded into this row
    pub duplicate_count: usize,
    pub thumbnail: Option<Thumbnail>,
}

/// Write applied without review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoApply {
    pub tile_index: usize,
    pub distance: usize,
    pub write: StockWrite,
}

/// Outcome of reconciling one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub auto_apply: Vec<AutoApply>,
    /// Ordered by tile
    pub confirmations: Vec<ConfirmationRow>,
    /// Tiles with neither a match nor a quantity
    pub discarded: Vec<usize>,
    /// Duplicate detections folded into a kept tile
    pub collapsed: Vec<usize>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.auto_apply.is_empty() && self.confirmations.is_empty()
    }

    pub fn writes(&self) -> Vec<StockWrite> {
        self.auto_apply.iter().map(|a| a.write.clone()).collect()
    }
}

fn distance_key(result: &RecognitionResult) -> usize {
    result.match_distance().unwrap_or(usize::MAX)
}

/// Indices of `members` grouped by ingredient, groups in first-seen order
fn group_by_ingredient(results: &[RecognitionResult], members: &[usize]) -> Vec<(usize, Vec<usize>)> {
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for &i in members {
        let Some(id) = results[i].ingredient_id() else {
            continue;
        };
        match groups.iter_mut().find(|(gid, _)| *gid == id) {
            Some((_, group)) => group.push(i),
            None => groups.push((id, vec![i])),
        }
    }
    groups
}

/// Lowest distance wins; `min_by_key` keeps the first of equal keys
fn pick_best(results: &[RecognitionResult], group: &[usize]) -> Option<usize> {
    group.iter().copied().min_by_key(|&i| distance_key(&results[i]))
}

/// Partition a batch into auto-apply writes, confirmation rows and empty cells
pub fn reconcile(
    results: &[RecognitionResult],
    catalog: &Catalog,
    config: &MatcherConfig,
) -> Reconciliation {
    let mut outcome = Reconciliation::default();
    let mut auto = Vec::new();
    let mut leftovers = Vec::new();

    for (i, result) in results.iter().enumerate() {
        let known = result
            .ingredient_id()
            .is_some_and(|id| catalog.get(id).is_some());
        if known && result.is_auto_apply(config) {
            auto.push(i);
        } else {
            leftovers.push(i);
        }
    }

    for (id, group) in group_by_ingredient(results, &auto) {
        let Some(best) = pick_best(results, &group) else {
            continue;
        };
        let Some(ingredient) = catalog.get(id) else {
            continue;
        };
        outcome.collapsed.extend(group.iter().filter(|&&i| i != best));
        outcome.auto_apply.push(AutoApply {
            tile_index: results[best].tile.index,
            distance: distance_key(&results[best]),
            write: StockWrite::new(ingredient.name.clone(), results[best].quantity),
        });
    }

    let mut rows: Vec<(usize, usize)> = Vec::new(); // (result index, duplicate count)
    let mut consumed: HashSet<usize> = HashSet::new();

    let with_quantity: Vec<usize> = leftovers
        .iter()
        .copied()
        .filter(|&i| results[i].has_quantity())
        .collect();
    for (_, group) in group_by_ingredient(results, &with_quantity) {
        let Some(best) = pick_best(results, &group) else {
            continue;
        };
        rows.push((best, group.len()));
        consumed.extend(group.iter().copied());
        outcome.collapsed.extend(group.iter().filter(|&&i| i != best));
    }

    for &i in &leftovers {
        if consumed.contains(&i) {
            continue;
        }
        let result = &results[i];
        if result.matched.is_some() && result.quantity >= config.auto_confirm_quantity_min {
            rows.push((i, 1));
            consumed.insert(i);
        }
    }

    for &i in &leftovers {
        if consumed.contains(&i) {
            continue;
        }
        let result = &results[i];
        if result.matched.is_none() && !result.has_quantity() {
            outcome.discarded.push(result.tile.index);
            continue;
        }
        rows.push((i, 1));
    }

    rows.sort_by_key(|&(i, _)| results[i].tile.index);
    outcome.confirmations = rows
        .into_iter()
        .map(|(i, duplicate_count)| confirmation_row(&results[i], duplicate_count, catalog, config))
        .collect();
    outcome.collapsed = outcome
        .collapsed
        .iter()
        .map(|&i| results[i].tile.index)
        .collect();
    outcome.collapsed.sort_unstable();

    debug!(
        auto_apply = outcome.auto_apply.len(),
        confirmations = outcome.confirmations.len(),
        discarded = outcome.discarded.len(),
        collapsed = outcome.collapsed.len(),
        "Reconciled batch"
    );
    outcome
}

fn confirmation_row(
    result: &RecognitionResult,
    duplicate_count: usize,
    catalog: &Catalog,
    config: &MatcherConfig,
) -> ConfirmationRow {
    let suggested_ingredient = result
        .ingredient_id()
        .and_then(|id| catalog.get(id))
        .map(|ingredient| ingredient.name.clone());
    let locked = suggested_ingredient.is_some()
        && result
            .match_distance()
            .is_some_and(|d| d <= config.auto_apply_distance_max);

    ConfirmationRow {
        tile: result.tile,
        suggested_ingredient,
        suggested_quantity: result.quantity,
        match_distance: result.match_distance(),
        reason: ConfirmReason::of(result, config),
        locked,
        duplicate_count,
        thumbnail: result.thumbnail.clone(),
    }
}

/// User edits for one confirmation row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowResolution {
    /// Replacement ingredient (name or alias); not allowed on locked rows
    pub ingredient: Option<String>,
    pub quantity: Option<u32>,
    pub discard: bool,
}

impl RowResolution {
    /// Accept the row as suggested
    pub fn accept() -> Self {
        Self::default()
    }

    pub fn discard() -> Self {
        Self {
            discard: true,
            ..Self::default()
        }
    }
}

/// Turn confirmation rows and the user's per-row edits into stock writes.
///
/// Rows left without an ingredient or with quantity 0 are skipped.
///
/// # Errors
///
/// `OcrError::Validation` when the number of resolutions does not match the
/// rows, an override names an unknown ingredient, or a locked row's
/// ingredient is overridden.
pub fn resolve_confirmations(
    rows: &[ConfirmationRow],
    resolutions: &[RowResolution],
    catalog: &Catalog,
) -> Result<Vec<StockWrite>, OcrError> {
    if rows.len() != resolutions.len() {
        return Err(OcrError::Validation(format!(
            "expected {} row resolutions, got {}",
            rows.len(),
            resolutions.len()
        )));
    }

    let mut writes = Vec::new();
    for (index, (row, resolution)) in rows.iter().zip(resolutions).enumerate() {
        if resolution.discard {
            continue;
        }

        let ingredient = match resolution.ingredient.as_deref() {
            Some(name) => {
                let canonical = catalog.find(name).map(|i| i.name.clone()).ok_or_else(|| {
                    OcrError::Validation(format!("row {}: unknown ingredient '{}'", index, name))
                })?;
                if row.locked && row.suggested_ingredient.as_deref() != Some(canonical.as_str()) {
                    return Err(OcrError::Validation(format!(
                        "row {}: ingredient is locked",
                        index
                    )));
                }
                Some(canonical)
            }
            None => row.suggested_ingredient.clone(),
        };

        let quantity = resolution.quantity.unwrap_or(row.suggested_quantity);
        match ingredient {
            Some(ingredient) if quantity > 0 => writes.push(StockWrite::new(ingredient, quantity)),
            _ => continue,
        }
    }

    Ok(writes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Ingredient;

    fn catalog() -> Catalog {
        let ingredient = |name: &str| Ingredient {
            id: 0,
            name: name.to_string(),
            image_ref: None,
            aliases: vec![format!("{}-alias", name)],
        };
        Catalog::from_ingredients(vec![
            ingredient("Apple"),
            ingredient("Honey"),
            ingredient("Milk"),
        ])
        .expect("catalog")
    }

    fn result(index: usize, matched: Option<(usize, usize)>, quantity: u32) -> RecognitionResult {
        RecognitionResult {
            tile: TileRect {
                index,
                row: 0,
                col: index as i32,
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
            raw_name_text: String::new(),
            raw_digit_text: String::new(),
            tokens: Vec::new(),
            matched: matched.map(|(id, distance)| IngredientMatch {
                id,
                votes: 1,
                distance,
            }),
            quantity,
            scale: 2.0,
            attempts: 1,
            thumbnail: None,
        }
    }

    #[test]
    fn test_auto_confirm_and_discard() {
        let results = vec![
            result(0, Some((0, 0)), 5),
            result(1, Some((0, 2)), 5),
            result(2, None, 0),
        ];
        let outcome = reconcile(&results, &catalog(), &MatcherConfig::default());

        assert_eq!(outcome.writes(), vec![StockWrite::new("Apple", 5)]);
        assert_eq!(outcome.confirmations.len(), 1);
        let row = &outcome.confirmations[0];
        assert_eq!(row.tile.index, 1);
        assert_eq!(row.suggested_ingredient.as_deref(), Some("Apple"));
        assert_eq!(row.reason, ConfirmReason::WeakMatch);
        assert!(!row.locked);
        assert_eq!(outcome.discarded, vec![2]);
    }

    #[test]
    fn test_large_quantity_needs_confirmation() {
        let results = vec![result(0, Some((1, 0)), 300), result(1, Some((2, 0)), 299)];
        let outcome = reconcile(&results, &catalog(), &MatcherConfig::default());

        assert_eq!(outcome.writes(), vec![StockWrite::new("Milk", 299)]);
        assert_eq!(outcome.confirmations.len(), 1);
        let row = &outcome.confirmations[0];
        assert_eq!(row.reason, ConfirmReason::LargeQuantity);
        assert!(row.locked);
    }

    #[test]
    fn test_duplicates_collapse_to_lowest_distance() {
        let results = vec![
            result(0, Some((1, 3)), 12),
            result(1, Some((1, 2)), 15),
            result(2, Some((1, 2)), 18),
        ];
        let outcome = reconcile(&results, &catalog(), &MatcherConfig::default());

        assert!(outcome.auto_apply.is_empty());
        assert_eq!(outcome.confirmations.len(), 1);
        let row = &outcome.confirmations[0];
        assert_eq!(row.tile.index, 1, "first seen wins the tie");
        assert_eq!(row.suggested_quantity, 15);
        assert_eq!(row.duplicate_count, 3);
        assert_eq!(outcome.collapsed, vec![0, 2]);
    }

    #[test]
    fn test_auto_duplicates_collapse() {
        let results = vec![result(0, Some((0, 1)), 4), result(1, Some((0, 0)), 6)];
        let outcome = reconcile(&results, &catalog(), &MatcherConfig::default());
        assert_eq!(outcome.writes(), vec![StockWrite::new("Apple", 6)]);
        assert_eq!(outcome.collapsed, vec![0]);
    }

    #[test]
    fn test_partial_signals_surface() {
        let results = vec![
            result(0, None, 7),
            result(1, Some((2, 0)), 0),
            result(2, Some((1, 3)), 0),
        ];
        let outcome = reconcile(&results, &catalog(), &MatcherConfig::default());

        let reasons: Vec<_> = outcome.confirmations.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                ConfirmReason::NoMatch,
                ConfirmReason::NoQuantity,
                ConfirmReason::NoQuantity
            ]
        );
        assert!(outcome.discarded.is_empty());
        assert!(outcome.confirmations[1].locked);
    }

    #[test]
    fn test_attempt_ranking() {
        let none = result(0, None, 0);
        let qty_only = result(0, None, 3);
        let weak = result(0, Some((0, 3)), 0);
        let close = result(0, Some((0, 1)), 0);
        let full = result(0, Some((0, 3)), 5);

        assert!(qty_only.outranks(&none));
        assert!(weak.outranks(&qty_only));
        assert!(close.outranks(&weak));
        assert!(full.outranks(&close));
        assert!(!none.outranks(&none.clone()));
        assert!(result(0, Some((0, 1)), 4).is_auto_apply(&MatcherConfig::default()));
        assert!(!full.is_auto_apply(&MatcherConfig::default()));
    }

    #[test]
    fn test_resolve_confirmations() {
        let catalog = catalog();
        let results = vec![
            result(0, Some((0, 3)), 5),
            result(1, None, 8),
            result(2, Some((1, 0)), 0),
            result(3, Some((2, 0)), 500),
        ];
        let outcome = reconcile(&results, &catalog, &MatcherConfig::default());
        assert_eq!(outcome.confirmations.len(), 4);

        let writes = resolve_confirmations(
            &outcome.confirmations,
            &[
                RowResolution {
                    ingredient: Some("Honey-alias".to_string()),
                    ..RowResolution::accept()
                },
                RowResolution::accept(),
                RowResolution {
                    quantity: Some(3),
                    ..RowResolution::accept()
                },
                RowResolution::discard(),
            ],
            &catalog,
        )
        .expect("resolve");

        // Row 1 has no ingredient and is skipped
        assert_eq!(
            writes,
            vec![StockWrite::new("Honey", 5), StockWrite::new("Honey", 3)]
        );
    }

    #[test]
    fn test_resolve_rejects_bad_input() {
        let catalog = catalog();
        let results = vec![result(0, Some((2, 0)), 0)];
        let outcome = reconcile(&results, &catalog, &MatcherConfig::default());

        assert!(resolve_confirmations(&outcome.confirmations, &[], &catalog).is_err());
        let unknown = RowResolution {
            ingredient: Some("Durian".to_string()),
            ..RowResolution::accept()
        };
        assert!(resolve_confirmations(&outcome.confirmations, &[unknown], &catalog).is_err());
        let relock = RowResolution {
            ingredient: Some("Apple".to_string()),
            ..RowResolution::accept()
        };
        assert!(matches!(
            resolve_confirmations(&outcome.confirmations, &[relock], &catalog),
            Err(OcrError::Validation(_))
        ));
    }
}
