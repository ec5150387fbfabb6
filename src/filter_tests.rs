//! Filter API and text-search tests over the fixture cache.

use crate::cancel::CancelToken;
use crate::error::SnomedError;
use crate::filter::FilterOperator;
use crate::testutil::{self, ids};

fn offsets_to_ids(fixture: &testutil::Fixture, offsets: &[u32]) -> Vec<u64> {
    offsets
        .iter()
        .map(|&offset| fixture.cache.concepts.id(offset))
        .collect()
}

#[test]
fn test_does_filter_matrix() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    assert!(provider.does_filter("concept", FilterOperator::IsA, "64572001"));
    assert!(provider.does_filter("concept", FilterOperator::DescendentOf, "64572001"));
    assert!(provider.does_filter("concept", FilterOperator::IsNotA, "64572001"));
    assert!(provider.does_filter("concept", FilterOperator::In, "723264001"));
    assert!(provider.does_filter("code", FilterOperator::Equal, "64572001"));
    assert!(provider.does_filter("code", FilterOperator::Regex, "^6457.*"));
    assert!(provider.does_filter("parent", FilterOperator::Equal, "64572001"));
    assert!(provider.does_filter("child", FilterOperator::Equal, "64572001"));

    assert!(!provider.does_filter("display", FilterOperator::Equal, "Disease"));
    assert!(!provider.does_filter("concept", FilterOperator::Regex, ".*"));
    assert!(!provider.does_filter("code", FilterOperator::Regex, "[unclosed"));
    assert!(!provider.does_filter("concept", FilterOperator::IsA, "  "));
}

#[test]
fn test_unsupported_filter_is_rejected() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(false);
    let err = provider
        .filter(&mut context, "display", FilterOperator::Equal, "Disease")
        .unwrap_err();
    assert!(matches!(err, SnomedError::NotSupported(_)));
}

#[test]
fn test_is_a_filter_scenario() {
    // Scenario: is-a on Disease yields the calibration descendants.
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(&mut context, "concept", FilterOperator::IsA, "64572001")
        .unwrap();
    assert_eq!(provider.execute_filters(&mut context).unwrap(), 1);

    assert_eq!(provider.filter_size(&context, 0), 5);
    let found = offsets_to_ids(&fixture, context.sets()[0].offsets());
    for expected in [
        ids::DISEASE,
        ids::CELLULITIS,
        ids::TETRALOGY,
        ids::GESTATIONAL_DIABETES,
    ] {
        assert!(found.contains(&expected), "missing {expected}");
    }
}

#[test]
fn test_descendent_of_excludes_self() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(&mut context, "concept", FilterOperator::DescendentOf, "64572001")
        .unwrap();
    provider.execute_filters(&mut context).unwrap();
    let found = offsets_to_ids(&fixture, context.sets()[0].offsets());
    assert_eq!(found.len(), 4);
    assert!(!found.contains(&ids::DISEASE));
}

#[test]
fn test_is_not_a_filter() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(&mut context, "concept", FilterOperator::IsNotA, "64572001")
        .unwrap();
    provider.execute_filters(&mut context).unwrap();
    let found = offsets_to_ids(&fixture, context.sets()[0].offsets());
    assert_eq!(found.len() as u32, fixture.cache.concepts.count() - 5);
    assert!(found.contains(&ids::FITNESS));
    assert!(found.contains(&ids::ROOT));
    assert!(!found.contains(&ids::DISEASE));
    assert!(!found.contains(&ids::CELLULITIS));
}

#[test]
fn test_in_filter_expands_refset_membership() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(&mut context, "concept", FilterOperator::In, "723264001")
        .unwrap();
    provider.execute_filters(&mut context).unwrap();
    let found = offsets_to_ids(&fixture, context.sets()[0].offsets());
    // The retired membership row must not surface.
    assert_eq!(found, vec![ids::FOOT]);
}

#[test]
fn test_in_filter_with_plain_codes() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(
            &mut context,
            "concept",
            FilterOperator::In,
            "64572001, 303248007",
        )
        .unwrap();
    provider.execute_filters(&mut context).unwrap();
    let found = offsets_to_ids(&fixture, context.sets()[0].offsets());
    assert_eq!(found.len(), 2);
    assert!(found.contains(&ids::DISEASE));
    assert!(found.contains(&ids::FITNESS));
}

#[test]
fn test_code_equal_and_regex_filters() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(&mut context, "code", FilterOperator::Equal, "64572001")
        .unwrap();
    provider
        .filter(&mut context, "code", FilterOperator::Regex, "^9000000000005")
        .unwrap();
    provider.execute_filters(&mut context).unwrap();

    assert_eq!(provider.filter_size(&context, 0), 1);
    // 900000000000509007, 900000000000548007, 900000000000549004,
    // 900000000000550004 share the prefix.
    assert_eq!(provider.filter_size(&context, 1), 4);
}

#[test]
fn test_parent_and_child_filters() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(&mut context, "parent", FilterOperator::Equal, "73211009")
        .unwrap();
    provider
        .filter(&mut context, "child", FilterOperator::Equal, "11687002")
        .unwrap();
    provider.execute_filters(&mut context).unwrap();

    let children = offsets_to_ids(&fixture, context.sets()[0].offsets());
    assert_eq!(children, vec![ids::GESTATIONAL_DIABETES]);
    let parents = offsets_to_ids(&fixture, context.sets()[1].offsets());
    assert_eq!(parents, vec![ids::DIABETES]);
}

#[test]
fn test_filter_cursor_iteration() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(&mut context, "concept", FilterOperator::IsA, "64572001")
        .unwrap();
    provider.execute_filters(&mut context).unwrap();

    let mut seen = 0;
    while provider.filter_more(&mut context, 0).unwrap() {
        let found = provider.filter_concept(&context, 0).unwrap();
        assert!(found.reference().is_some());
        seen += 1;
    }
    assert_eq!(seen, provider.filter_size(&context, 0));
    assert!(provider.filter_concept(&context, 0).is_some());
    provider.filter_finish(context).unwrap();
}

#[test]
fn test_filter_locate_and_check() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(false);
    provider
        .filter(&mut context, "concept", FilterOperator::IsA, "64572001")
        .unwrap();
    provider.execute_filters(&mut context).unwrap();

    let inside = provider.filter_locate(&context, 0, "128045006").unwrap();
    assert!(provider.filter_check(&context, 0, &inside));

    let err = provider.filter_locate(&context, 0, "303248007").unwrap_err();
    assert!(err.contains("not in the filtered set"));

    let outside = provider.locate("303248007").context.unwrap();
    assert!(!provider.filter_check(&context, 0, &outside));
}

#[test]
fn test_search_display_prefix_rating() {
    // Scenario: "disease" hits Disease (disorder) as a display prefix,
    // rating between 80 and 90.
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    let set = provider.search_filter(&mut context, "disease", true).unwrap();

    let results = &context.sets()[set];
    assert_eq!(
        offsets_to_ids(&fixture, results.offsets()),
        vec![ids::DISEASE]
    );
    let rating = results.rating(0).unwrap();
    assert!(
        (80.0..=90.0).contains(&rating),
        "expected display-prefix rating, got {rating}"
    );
}

#[test]
fn test_search_exact_code_rates_100() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    let set = provider.search_filter(&mut context, "64572001", true).unwrap();
    let results = &context.sets()[set];
    assert!(!results.is_empty());
    assert_eq!(
        fixture.cache.concepts.id(results.offsets()[0]),
        ids::DISEASE
    );
    assert_eq!(results.rating(0), Some(100.0));
}

#[test]
fn test_search_exact_display_outranks_substring() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    let set = provider.search_filter(&mut context, "diabetes", true).unwrap();
    let results = &context.sets()[set];
    let found = offsets_to_ids(&fixture, results.offsets());
    assert!(found.contains(&ids::DIABETES));
    assert!(found.contains(&ids::GESTATIONAL_DIABETES));
    // "Diabetes" is an exact display match and sorts first.
    assert_eq!(found[0], ids::DIABETES);
    assert_eq!(results.rating(0), Some(100.0));
    assert!(results.rating(1).unwrap() < 100.0);
}

#[test]
fn test_search_multi_word_intersects() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    let set = provider
        .search_filter(&mut context, "gestational diabetes", true)
        .unwrap();
    let results = &context.sets()[set];
    assert_eq!(
        offsets_to_ids(&fixture, results.offsets()),
        vec![ids::GESTATIONAL_DIABETES]
    );
}

#[test]
fn test_search_stems_match_inflected_query() {
    // "diseases" stems to the same bucket as "disease".
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    let set = provider.search_filter(&mut context, "diseases", true).unwrap();
    let found = offsets_to_ids(&fixture, context.sets()[set].offsets());
    assert!(found.contains(&ids::DISEASE));
}

#[test]
fn test_search_no_hits_is_empty() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    let set = provider
        .search_filter(&mut context, "xenotransplantation", true)
        .unwrap();
    assert!(context.sets()[set].is_empty());
}

#[test]
fn test_cancelled_context_stops_filtering() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut context = provider.get_prep_context_with(true, cancel);
    provider
        .filter(&mut context, "concept", FilterOperator::IsNotA, "64572001")
        .unwrap();
    let err = provider.execute_filters(&mut context).unwrap_err();
    assert!(matches!(err, SnomedError::Cancelled(_)));
}

#[test]
fn test_filter_unknown_code_is_not_found() {
    let fixture = testutil::fixture();
    let provider = fixture.provider();
    let mut context = provider.get_prep_context(true);
    provider
        .filter(&mut context, "concept", FilterOperator::IsA, "999999999")
        .unwrap();
    assert!(matches!(
        provider.execute_filters(&mut context),
        Err(SnomedError::NotFound { .. })
    ));
}
