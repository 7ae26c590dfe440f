//! Drives a `SnapMap` through the `KvStore` trait only, the way a consumer that
//! is generic over its store would.

use std::collections::HashMap;

use snapmap::{KvStore, SnapMap};

fn store() -> impl KvStore<String, u64, Hasher = std::collections::hash_map::RandomState> {
    SnapMap::builder().name("kv").build()
}

fn key(s: &str) -> String {
    s.to_string()
}

#[test]
fn set_get_delete() {
    let kv = store();
    kv.set(key("a"), 1);
    assert_eq!(kv.get(&key("a")), Some(1));

    kv.delete(&key("a"));
    assert_eq!(kv.get(&key("a")), None);
}

#[test]
fn get_or_set() {
    let kv = store();
    assert_eq!(kv.get_or_set(key("b"), 5), (5, false));
    assert_eq!(kv.get_or_set(key("b"), 9), (5, true));
    assert_eq!(kv.get_and_delete(&key("b")), Some(5));
    assert_eq!(kv.get_and_delete(&key("b")), None);
}

#[test]
fn compare_and_swap() {
    let kv = store();
    kv.set(key("a"), 1);
    assert!(kv.compare_and_swap(&key("a"), &1, 2));
    assert_eq!(kv.get(&key("a")), Some(2));
    assert!(!kv.compare_and_swap(&key("a"), &1, 3));
    assert_eq!(kv.get(&key("a")), Some(2));
}

#[test]
fn swap_multiple() {
    let kv = store();
    kv.set(key("y"), 5);

    let mut pairs = HashMap::new();
    pairs.insert(key("x"), 10);
    pairs.insert(key("y"), 20);
    let previous = kv.swap_multiple(pairs);
    assert_eq!(previous.len(), 2);
    assert_eq!(previous["x"], None);
    assert_eq!(previous["y"], Some(5));

    assert_eq!(kv.get(&key("x")), Some(10));
    assert_eq!(kv.get(&key("y")), Some(20));

    let deleted = kv.delete_multiple(&[key("x"), key("z")]);
    assert_eq!(deleted["x"], Some(10));
    assert_eq!(deleted["z"], None);

    let values = kv.load_multiple(&[key("x"), key("y")]);
    assert_eq!(values["x"], None);
    assert_eq!(values["y"], Some(20));
}

#[test]
fn iterate_thousand_fresh_keys() {
    let kv = store();
    for i in 0..1_000 {
        kv.set(format!("key{i}"), i);
        assert_eq!(kv.get(&format!("key{}", i / 2)), Some(i / 2));
    }

    let mut seen = HashMap::new();
    kv.iter(|k, v| {
        assert!(seen.insert(k.clone(), *v).is_none());
        true
    });
    assert_eq!(seen.len(), 1_000);
    assert!(seen.iter().all(|(k, v)| *k == format!("key{v}")));

    let mut visited = 0;
    kv.iter(|_, _| {
        visited += 1;
        visited < 10
    });
    assert_eq!(visited, 10);
}
