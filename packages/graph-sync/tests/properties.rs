//! Property tests for identifiers and classification.

use graph_sync::{
    normalize, Category, Classifier, EntityId, EntityKind, Label, ProgramLevel, ProgramType,
    TechnologyFocus, UnitFocus,
};
use proptest::prelude::*;

fn label_strs<L: Label>() -> Vec<&'static str> {
    L::ALL.iter().map(|l| l.as_str()).collect()
}

proptest! {
    #[test]
    fn identifier_ignores_normalization(name in ".{0,40}") {
        for kind in EntityKind::ALL {
            prop_assert_eq!(EntityId::new(kind, &name), EntityId::new(kind, &normalize(&name)));
        }
    }

    #[test]
    fn normalize_is_idempotent(name in "[A-Za-z0-9 _&/()\\-.,]{0,40}") {
        let once = normalize(&name);
        prop_assert_eq!(normalize(&once), once.clone());
    }

    #[test]
    fn identifier_ignores_case_and_spacing(name in "[A-Za-z]{1,10}( [A-Za-z]{1,10}){0,3}") {
        let shouted = format!("  {}  ", name.to_uppercase().replace(' ', "   "));
        prop_assert_eq!(
            EntityId::new(EntityKind::Unit, &name),
            EntityId::new(EntityKind::Unit, &shouted)
        );
    }

    #[test]
    fn classification_is_total(text in proptest::option::of(".{0,80}")) {
        let classifier = Classifier::default();
        let text = text.as_deref();

        let cases = [
            (Category::ProgramLevel, label_strs::<ProgramLevel>()),
            (Category::ProgramType, label_strs::<ProgramType>()),
            (Category::TechnologyFocus, label_strs::<TechnologyFocus>()),
            (Category::UnitFocus, label_strs::<UnitFocus>()),
        ];
        for (category, labels) in cases {
            let label = classifier.classify(text, category);
            prop_assert!(labels.contains(&label), "{:?} -> {}", category, label);
        }
    }
}

#[test]
fn absent_and_empty_text_get_defaults() {
    let classifier = Classifier::default();
    for text in [None, Some(""), Some("   ")] {
        assert_eq!(classifier.program_level(text), ProgramLevel::DEFAULT);
        assert_eq!(classifier.program_type(text), ProgramType::DEFAULT);
        assert_eq!(classifier.technology_focus(text), TechnologyFocus::DEFAULT);
        assert_eq!(classifier.unit_focus(text), UnitFocus::DEFAULT);
    }
}
