#![no_main]

use libfuzzer_sys::fuzz_target;
use singleton_factory::{ArgSpec, SingletonFactory, SlotRecord, Value};
use std::sync::Arc;

// Builds an argument tree from the input bytes
fn value(data: &mut &[u8], depth: usize) -> Value {
    let Some((&tag, rest)) = data.split_first() else {
        return Value::Undefined;
    };
    *data = rest;

    match tag % 8 {
        0 => Value::Null,
        1 => Value::from(tag & 0x10 != 0),
        2 => Value::from(tag as i64 - 128),
        3 => Value::from(f64::from(tag) / 7.0),
        4 => {
            let len = (tag as usize / 8).min(data.len());
            let (text, rest) = data.split_at(len);
            *data = rest;
            Value::from(String::from_utf8_lossy(text).into_owned())
        }
        5 if depth < 4 => Value::list((0..tag % 4).map(|_| value(data, depth + 1)).collect::<Vec<_>>()),
        6 if depth < 4 => Value::record(
            (0..tag % 3)
                .map(|i| (format!("k{}", i), value(data, depth + 1)))
                .collect::<Vec<_>>(),
        ),
        _ => Value::Undefined,
    }
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let spec = match data[0] % 4 {
        0 => ArgSpec::new().slot(SlotRecord::new("literal").rest()),
        1 => ArgSpec::from_tokens(["object", "set:literal"]),
        2 => ArgSpec::from_tokens(["property:k0", "array", "ignore"]),
        _ => ArgSpec::new().slot("literal").slot(SlotRecord::new("literal").rest().unordered()),
    };
    let factory = SingletonFactory::new(|args: &[Value]| Ok(args.to_vec()), spec).unwrap();

    let mut input = &data[1..];
    let mut args = Vec::new();
    while !input.is_empty() && args.len() < 8 {
        args.push(value(&mut input, 0));
    }

    let key = factory.key(&args).unwrap();
    let instance = factory.call(&args).unwrap();

    // Keys are stable and instances key back to themselves
    assert_eq!(factory.key(&args).unwrap(), key);
    assert!(Arc::ptr_eq(&factory.call(&args).unwrap(), &instance));
    assert_eq!(factory.key(&[Value::native(instance.clone())]).unwrap(), key);
});
