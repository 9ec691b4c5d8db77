#[cfg(test)]
mod tests {
    use stock_grid::catalog::Catalog;
    use stock_grid::config::MatcherConfig;
    use stock_grid::matcher::{analyze_tile, build_index, KeywordIndex};

    fn setup() -> (Catalog, KeywordIndex, MatcherConfig) {
        let catalog = Catalog::embedded().expect("embedded catalog");
        let config = MatcherConfig::default();
        let index = build_index(catalog.ingredients(), &config.stopwords);
        (catalog, index, config)
    }

    #[test]
    fn test_every_catalog_name_matches_itself() {
        let (catalog, index, config) = setup();
        assert!(!catalog.is_empty());

        for ingredient in catalog.ingredients() {
            let analysis = analyze_tile(&index, &ingredient.name, "×3", config.max_distance);
            let matched = analysis
                .matched
                .unwrap_or_else(|| panic!("{} did not match", ingredient.name));
            assert_eq!(matched.id, ingredient.id, "{}", ingredient.name);
            assert_eq!(matched.distance, 0);
            assert_eq!(analysis.quantity, 3);
        }
    }

    #[test]
    fn test_single_glyph_confusion_is_tolerated() {
        let (catalog, index, config) = setup();

        let analysis = analyze_tile(&index, "ほっこりボテト", "x21", config.max_distance);
        let matched = analysis.matched.expect("match");
        assert_eq!(
            catalog.get(matched.id).map(|i| i.name.as_str()),
            Some("ほっこりポテト")
        );
        assert_eq!(matched.distance, 1);
        assert_eq!(matched.votes, 0, "found by the full scan");
        assert_eq!(analysis.quantity, 21);
    }

    #[test]
    fn test_noise_around_name() {
        let (catalog, index, config) = setup();

        let analysis = analyze_tile(&index, "■ とくせんリンゴ ■", "", config.max_distance);
        let matched = analysis.matched.expect("match");
        assert_eq!(
            catalog.get(matched.id).map(|i| i.name.as_str()),
            Some("とくせんリンゴ")
        );
        assert_eq!(matched.distance, 0);
        assert_eq!(analysis.quantity, 0);
    }

    #[test]
    fn test_unrelated_text_has_no_match() {
        let (_, index, config) = setup();
        let analysis = analyze_tile(&index, "ぜんぜんちがうもじれつ", "", config.max_distance);
        assert!(analysis.matched.is_none());
    }

    #[test]
    fn test_lookup_by_alias() {
        let (catalog, _, _) = setup();
        let honey = catalog.find("ミツ").expect("alias lookup");
        assert_eq!(honey.name, "あまいミツ");
        assert_eq!(catalog.find("あまいミツ").map(|i| i.id), Some(honey.id));
    }
}
