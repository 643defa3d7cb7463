// tests/path_matcher.rs

use proptest::prelude::*;
use vgrid_events::watch::{PathMatcher, matches};

#[test]
fn star_slash_config_is_direct_only_one_level_deep() {
    let one = matches("*/config", "a/config").unwrap();
    assert!(one.direct);
    assert!(one.recursive);

    let two = matches("*/config", "a/b/config").unwrap();
    assert!(!two.direct);
    assert!(two.recursive);
}

#[test]
fn recursive_only_hit_respects_rule_flag() {
    let hit = matches("/data/P/*.csv", "/data/P/sub/x.csv").unwrap();
    assert!(!hit.accepted_by(false));
    assert!(hit.accepted_by(true));
}

#[test]
fn sibling_workspace_with_shared_prefix_does_not_match() {
    let matcher = PathMatcher::new("/data/Project/*").unwrap();
    assert_eq!(matcher.literal_prefix(), "/data/Project/");
    assert!(!matcher.matches("/data/Project-Management/a.txt").any());
    assert!(matcher.matches("/data/Project/a.txt").direct);
}

#[test]
fn character_classes_follow_shell_rules() {
    assert!(matches("[!a]*.log", "b.log").unwrap().direct);
    assert!(!matches("[!a]*.log", "a.log").unwrap().direct);
    assert!(matches("run-[0-9].out", "run-7.out").unwrap().direct);
    assert!(!matches("run-[0-9].out", "run-x.out").unwrap().direct);
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_.-]{1,8}".prop_filter("no dot entries", |s| s != "." && s != "..")
}

fn path_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(segment(), 1..5)
}

proptest! {
    #[test]
    fn literal_paths_match_themselves(segments in path_strategy()) {
        let path = segments.join("/");
        let hit = matches(&path, &path).unwrap();
        prop_assert!(hit.direct);
        prop_assert!(hit.recursive);
    }

    #[test]
    fn lone_star_is_direct_only_without_separator(segments in path_strategy()) {
        let path = segments.join("/");
        let hit = matches("*", &path).unwrap();
        prop_assert!(hit.recursive);
        prop_assert_eq!(hit.direct, segments.len() == 1);
    }

    #[test]
    fn wildcarded_segments_still_match_directly(
        segments in path_strategy(),
        mask in proptest::collection::vec(any::<bool>(), 5),
    ) {
        let path = segments.join("/");
        let pattern: Vec<&str> = segments
            .iter()
            .zip(mask.iter())
            .map(|(seg, star)| if *star { "*" } else { seg.as_str() })
            .collect();
        let hit = matches(&pattern.join("/"), &path).unwrap();
        prop_assert!(hit.direct);
        prop_assert!(hit.recursive);
    }

    #[test]
    fn direct_hit_implies_recursive_hit(
        pattern in "[a-c*?/]{1,8}",
        path in "[a-c/]{1,10}",
    ) {
        let hit = matches(&pattern, &path).unwrap();
        prop_assert!(!hit.direct || hit.recursive);
    }
}
