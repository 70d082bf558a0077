/// Property-based tests for key derivation
///
/// These check the equivalence laws of composite keys over arbitrary
/// argument trees rather than hand-picked examples.

use proptest::prelude::*;
use singleton_factory::{ArgSpec, SingletonFactory, SlotRecord, Value};
use std::sync::Arc;

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Undefined),
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-z,:|=\\[\\]{}]{0,6}".prop_map(Value::from),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::list),
            prop::collection::btree_map("[a-c]{1,2}", inner, 0..3).prop_map(Value::record),
        ]
    })
}

fn arguments() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(value(), 0..4)
}

fn literal_factory() -> SingletonFactory<Vec<Value>> {
    SingletonFactory::builder(|args: &[Value]| Ok(args.to_vec())).build().unwrap()
}

// Property: two argument lists share an instance exactly when they share a key
proptest! {
    #[test]
    fn same_key_iff_same_instance(a in arguments(), b in arguments(), reuse in any::<bool>()) {
        let factory = literal_factory();
        let b = if reuse { a.clone() } else { b };

        let same_key = factory.key(&a).unwrap() == factory.key(&b).unwrap();
        let first = factory.call(&a).unwrap();
        let second = factory.call(&b).unwrap();

        prop_assert_eq!(same_key, Arc::ptr_eq(&first, &second));
    }
}

// Property: literal keys are injective over structural content
proptest! {
    #[test]
    fn literal_keys_match_structural_equality(a in arguments(), b in arguments()) {
        let factory = literal_factory();
        prop_assert_eq!(factory.key(&a).unwrap() == factory.key(&b).unwrap(), a == b);
    }
}

// Property: produced instances key back to their own key
proptest! {
    #[test]
    fn instances_round_trip(a in arguments()) {
        let factory = literal_factory();
        let instance = factory.call(&a).unwrap();
        let as_arg = [Value::native(instance.clone())];

        prop_assert_eq!(factory.key(&as_arg).unwrap(), factory.key(&a).unwrap());
        prop_assert!(Arc::ptr_eq(&factory.call(&as_arg).unwrap(), &instance));
        prop_assert_eq!(factory.len(), 1);
    }
}

// Property: lookups are read-only
proptest! {
    #[test]
    fn get_never_inserts(a in arguments()) {
        let factory = literal_factory();

        prop_assert!(factory.get(&a).unwrap().is_none());
        prop_assert!(factory.get(&a).unwrap().is_none());
        prop_assert!(factory.is_empty());
    }
}

// Property: set slots and unordered rest slots ignore element order
proptest! {
    #[test]
    fn order_insensitive_modes(items in prop::collection::vec(leaf(), 0..6), rotate in 0usize..6) {
        let mut permuted = items.clone();
        if !permuted.is_empty() {
            let by = rotate % permuted.len();
            permuted.rotate_left(by);
        }
        permuted.reverse();

        let set = SingletonFactory::new(|_: &[Value]| Ok(()), ArgSpec::from_tokens(["set:literal"])).unwrap();
        prop_assert_eq!(
            set.key(&[Value::list(items.clone())]).unwrap(),
            set.key(&[Value::list(permuted.clone())]).unwrap()
        );

        let unordered = SingletonFactory::new(
            |_: &[Value]| Ok(()),
            ArgSpec::new().slot(SlotRecord::new("literal").rest().unordered()),
        )
        .unwrap();
        prop_assert_eq!(unordered.key(&items).unwrap(), unordered.key(&permuted).unwrap());
    }
}

// Property: ignored positions never influence the key
proptest! {
    #[test]
    fn ignored_positions(head in value(), x in value(), y in value()) {
        let factory = SingletonFactory::new(|_: &[Value]| Ok(()), ArgSpec::from_tokens(["literal", "ignore"])).unwrap();
        prop_assert_eq!(
            factory.key(&[head.clone(), x]).unwrap(),
            factory.key(&[head, y]).unwrap()
        );
    }
}
