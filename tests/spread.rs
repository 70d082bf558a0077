use singleton_factory::{args, ArgSpec, ArgType, Behavior, FactoryError, SingletonFactory, SlotRecord, SpreadSource, Value};
use std::sync::Arc;

#[derive(Debug)]
struct Person {
    name: String,
}

#[derive(Debug)]
struct Persons {
    persons: Vec<Arc<Person>>,
}

impl Persons {
    fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Persons {
        Persons {
            persons: names
                .into_iter()
                .map(|name| Arc::new(Person { name: name.to_string() }))
                .collect(),
        }
    }

    fn names(&self) -> Vec<&str> {
        self.persons.iter().map(|p| p.name.as_str()).collect()
    }
}

fn person(name: &str) -> Value {
    Value::native(Arc::new(Person { name: name.to_string() }))
}

fn persons(names: &[&str]) -> Value {
    Value::native(Arc::new(Persons::new(names.iter().copied())))
}

fn crowd_factory() -> SingletonFactory<Persons> {
    SingletonFactory::builder(|args: &[Value]| Ok(Persons::new(args.iter().filter_map(Value::as_str))))
        .spec(ArgSpec::new().slot(SlotRecord::new("literal").rest()))
        .spread_with(|crowd: &Persons| crowd.persons.iter().map(|p| Value::native(p.clone())).collect())
        .custom_arg_type::<Person>(
            Behavior::new().convert(|arg| Ok(Value::from(arg.downcast_ref::<Person>().map(|p| p.name.clone())))),
        )
        .custom_arg(ArgType::List, Behavior::new().spread(SpreadSource::Elements))
        .build()
        .unwrap()
}

#[test]
fn test_spread_containers() {
    let crowd_of = crowd_factory();

    let crowd = crowd_of
        .call(&args![
            "Sam",
            "Nancy",
            person("Harry"),
            persons(&["Johnny", "Sally"]),
            Value::list([Value::from("Peter"), person("Paul"), persons(&["Pauline", "Louis"])]),
        ])
        .unwrap();

    assert_eq!(
        crowd.names(),
        ["Sam", "Nancy", "Harry", "Johnny", "Sally", "Peter", "Paul", "Pauline", "Louis"]
    );
}

#[test]
fn test_spread_instance_maps_back_to_itself() {
    let crowd_of = crowd_factory();

    let crowd = crowd_of.call(&args!["Ann", "Bob"]).unwrap();
    let again = crowd_of.call(&[Value::native(crowd.clone())]).unwrap();
    let mixed = crowd_of.call(&args![person("Ann"), Value::list(["Bob"])]).unwrap();

    assert!(Arc::ptr_eq(&crowd, &again));
    assert!(Arc::ptr_eq(&crowd, &mixed));
    assert_eq!(crowd_of.len(), 1);
}

#[test]
fn test_shallow_spread_stops_after_one_level() {
    let flat = SingletonFactory::builder(|args: &[Value]| Ok(args.to_vec()))
        .custom_arg(ArgType::List, Behavior::new().shallow_spread(SpreadSource::Elements))
        .build()
        .unwrap();

    let nested = Value::list([Value::from(1), Value::list([2, 3])]);
    let args = flat.call(&[nested, Value::from(4)]).unwrap();

    assert_eq!(args.len(), 3);
    assert_eq!(args[1], Value::list([2, 3]));
}

#[test]
fn test_factory_shallow_spread_with() {
    let groups = SingletonFactory::builder(|args: &[Value]| Ok(Persons::new(args.iter().filter_map(Value::as_str))))
        .shallow_spread_with(|group: &Persons| group.names().into_iter().map(Value::from).collect())
        .build()
        .unwrap();

    let group = groups.call(&args!["a", "b"]).unwrap();
    let copy = groups.call(&[persons(&["a", "b"])]).unwrap();
    assert!(Arc::ptr_eq(&group, &copy));
}

#[test]
fn test_spread_needs_a_sequence() {
    let broken = SingletonFactory::builder(|args: &[Value]| Ok(args.len()))
        .custom_arg(ArgType::Record, Behavior::new().spread(SpreadSource::Elements))
        .build()
        .unwrap();

    assert!(matches!(
        broken.call(&[Value::record([("a", 1)])]),
        Err(FactoryError::Hook { .. })
    ));
}

#[test]
fn test_spread_conflicts_with_registered_own_type() {
    let built = SingletonFactory::builder(|_: &[Value]| Ok(Persons::new([])))
        .spread(SpreadSource::Elements)
        .custom_arg_type::<Persons>(
            Behavior::new()
                .reduce(|_| Ok(Value::Null))
                .postprocess(|_, _| Ok(())),
        )
        .build();
    assert!(matches!(built, Err(FactoryError::Configuration(_))));

    // A convert-only registration merges with the factory spread
    let merged = SingletonFactory::builder(|args: &[Value]| Ok(Persons::new(args.iter().filter_map(Value::as_str))))
        .spread_with(|group: &Persons| group.names().into_iter().map(Value::from).collect())
        .custom_arg_type::<Persons>(Behavior::new().convert(|_| Ok(Value::from("unused"))))
        .build()
        .unwrap();
    let group = merged.call(&[persons(&["x"])]).unwrap();
    assert_eq!(group.names(), ["x"]);
}
