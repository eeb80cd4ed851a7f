use proptest::prelude::*;
use provisioning_core::{camelize_key, camelize_keys, last_path_segment, Params};
use serde_json::Value;

proptest! {
    #[test]
    fn camelized_keys_never_contain_underscores(key in "[A-Za-z_][A-Za-z0-9_]{0,24}") {
        prop_assert!(!camelize_key(&key).contains('_'));
    }

    #[test]
    fn camelize_is_idempotent(key in "[a-z][a-z0-9_]{0,24}") {
        let once = camelize_key(&key);
        prop_assert_eq!(camelize_key(&once), once);
    }

    #[test]
    fn snake_words_are_joined_with_capitals(
        words in proptest::collection::vec("[a-z]{1,8}", 1..5),
    ) {
        let snake = words.join("_");
        let mut expected = words[0].clone();
        for word in &words[1..] {
            expected.push_str(&word[..1].to_ascii_uppercase());
            expected.push_str(&word[1..]);
        }
        prop_assert_eq!(camelize_key(&snake), expected);
    }

    #[test]
    fn nested_values_are_untouched(inner_key in "[a-z]{1,6}_[a-z]{1,6}") {
        let mut nested = serde_json::Map::new();
        nested.insert(inner_key.clone(), Value::from(1));
        let mut params = Params::new();
        params.insert("outer_key".to_string(), Value::Object(nested.clone()));

        let camelized = camelize_keys(params);
        prop_assert_eq!(camelized.get("outerKey"), Some(&Value::Object(nested)));
    }

    #[test]
    fn last_segment_of_href(id in "[0-9]{1,9}", trailing in proptest::bool::ANY) {
        let mut href = format!("http://api.tropo.com/v1/applications/{id}");
        if trailing {
            href.push('/');
        }
        prop_assert_eq!(last_path_segment(&href), id.as_str());
    }
}
