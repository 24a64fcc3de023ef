//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for generating case ids.
pub fn case_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating distinct, non-empty sets of case ids.
pub fn case_id_set_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(case_id_strategy(), 1..=max.max(1))
        .prop_map(|ids| ids.into_iter().collect())
}

/// Strategy for generating case property values.
pub fn property_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ]{0,16}").expect("Invalid regex")
}
