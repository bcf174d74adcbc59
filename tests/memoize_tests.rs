//! Tests for memoization
//!
//! These tests verify:
//! - Equal arguments hit the same entry, different ones do not
//! - Keyword argument order does not change the key
//! - Static expiry bound at wrap time, plus the first-call and per-call TTLs

use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use tempfile::TempDir;
use zealot::{derive_key, CallArgs, Config, Datastore, Expiry, ManualClock, ZealotError};

// =============================================================================
// Helper Functions
// =============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

fn setup_temp_store() -> (TempDir, Arc<ManualClock>, Datastore) {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let config = Config::builder().data_dir(temp_dir.path()).build();
    let store = Datastore::open_with_clock(config, clock.clone()).unwrap();
    (temp_dir, clock, store)
}

#[derive(Serialize)]
struct Fetch<'a> {
    url: &'a str,
    lang: &'a str,
}

// =============================================================================
// Key Tests
// =============================================================================

#[test]
fn test_identical_args_hit_same_entry() {
    let (_temp, _clock, store) = setup_temp_store();
    let calls = Cell::new(0);

    let get_html = store.cache(t0() + Duration::minutes(10)).wrap("get_html", |url: &str| {
        calls.set(calls.get() + 1);
        Ok::<_, io::Error>(format!("<html>{}</html>", url).into_bytes())
    });

    let first = get_html.call("https://example.com").unwrap();
    let second = get_html.call("https://example.com").unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.get(), 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_different_args_are_different_entries() {
    let (_temp, _clock, store) = setup_temp_store();

    let echo = store
        .cache(t0() + Duration::minutes(10))
        .wrap("echo", |n: &u32| Ok::<_, io::Error>(n.to_string().into_bytes()));

    assert_eq!(echo.call(&1).unwrap(), b"1".to_vec());
    assert_eq!(echo.call(&2).unwrap(), b"2".to_vec());
    assert_eq!(store.len(), 2);
}

#[test]
fn test_key_includes_function_name() {
    let (_temp, _clock, store) = setup_temp_store();
    let memo = store.cache(t0() + Duration::minutes(10));

    let upper = memo.wrap("upper", |s: &str| Ok::<_, io::Error>(s.to_uppercase().into_bytes()));
    let lower = memo.wrap("lower", |s: &str| Ok::<_, io::Error>(s.to_lowercase().into_bytes()));

    assert_eq!(upper.call("MiXeD").unwrap(), b"MIXED".to_vec());
    assert_eq!(lower.call("MiXeD").unwrap(), b"mixed".to_vec());
    assert_eq!(upper.key_for("x").unwrap(), r#"upper "x""#);
}

#[test]
fn test_kwargs_order_does_not_matter() {
    let (_temp, _clock, store) = setup_temp_store();
    let calls = Cell::new(0);

    let search = store.cache(t0() + Duration::minutes(10)).wrap("search", |args: &CallArgs| {
        calls.set(calls.get() + 1);
        Ok::<_, io::Error>(format!("{:?}", args.keyword("q")).into_bytes())
    });

    let a = CallArgs::new()
        .arg("web")
        .unwrap()
        .kwarg("q", "rust")
        .unwrap()
        .kwarg("page", 2)
        .unwrap();
    let b = CallArgs::new()
        .arg("web")
        .unwrap()
        .kwarg("page", 2)
        .unwrap()
        .kwarg("q", "rust")
        .unwrap();

    search.call(&a).unwrap();
    search.call(&b).unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(search.key_for(&a).unwrap(), search.key_for(&b).unwrap());
}

#[test]
fn test_map_kwargs_are_order_independent() {
    let mut first = HashMap::new();
    let mut second = HashMap::new();
    for (k, v) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        first.insert(k, v);
    }
    for (k, v) in [("d", 4), ("c", 3), ("b", 2), ("a", 1)] {
        second.insert(k, v);
    }

    assert_eq!(derive_key("f", &first).unwrap(), derive_key("f", &second).unwrap());
}

#[test]
fn test_struct_args_key() {
    let key = derive_key(
        "get_html",
        &Fetch {
            url: "https://example.com",
            lang: "en",
        },
    )
    .unwrap();

    assert_eq!(key, r#"get_html {"lang":"en","url":"https://example.com"}"#);
}

// =============================================================================
// Expiry Tests
// =============================================================================

#[test]
fn test_static_expiry_shared_by_all_calls() {
    let (_temp, clock, store) = setup_temp_store();
    let deadline = t0() + Duration::minutes(10);
    let calls = Cell::new(0);

    let f = store.cache(deadline).wrap("f", |n: &u32| {
        calls.set(calls.get() + 1);
        Ok::<_, io::Error>(vec![*n as u8])
    });

    f.call(&1).unwrap();

    // A first call late in the window still gets the wrap-time deadline
    clock.set(deadline - Duration::seconds(1));
    f.call(&2).unwrap();
    assert_eq!(store.lookup(&f.key_for(&2).unwrap()).unwrap().expires_at, deadline);

    // Past the deadline every call recomputes, even right after storing
    clock.set(deadline + Duration::seconds(1));
    f.call(&1).unwrap();
    f.call(&1).unwrap();
    assert_eq!(calls.get(), 4);
}

#[test]
fn test_cache_for_is_relative_to_wrap_time() {
    let (_temp, clock, store) = setup_temp_store();

    let memo = store.cache_for(Duration::minutes(5)).unwrap();
    clock.advance(Duration::minutes(3));
    let f = memo.wrap("f", |_: &()| Ok::<_, io::Error>(b"v".to_vec()));
    f.call(&()).unwrap();

    let entry = store.lookup(&f.key_for(&()).unwrap()).unwrap();
    assert_eq!(entry.expires_at, t0() + Duration::minutes(5));
    assert_eq!(memo.expiry(), Expiry::At(t0() + Duration::minutes(5)));
}

#[test]
fn test_after_first_call_expiry() {
    let (_temp, clock, store) = setup_temp_store();

    let f = store
        .cache_with(Expiry::AfterFirstCall(Duration::minutes(10)))
        .wrap("f", |n: &u32| Ok::<_, io::Error>(vec![*n as u8]));

    clock.advance(Duration::minutes(1));
    f.call(&1).unwrap();
    clock.advance(Duration::minutes(5));
    f.call(&2).unwrap();

    let expected = t0() + Duration::minutes(11);
    assert_eq!(store.lookup(&f.key_for(&1).unwrap()).unwrap().expires_at, expected);
    assert_eq!(store.lookup(&f.key_for(&2).unwrap()).unwrap().expires_at, expected);
}

#[test]
fn test_after_each_call_expiry() {
    let (_temp, clock, store) = setup_temp_store();
    let calls = Cell::new(0);

    let f = store
        .cache_with(Expiry::AfterEachCall(Duration::minutes(10)))
        .wrap("f", |_: &()| {
            calls.set(calls.get() + 1);
            Ok::<_, io::Error>(b"v".to_vec())
        });

    f.call(&()).unwrap();
    clock.advance(Duration::minutes(11));
    f.call(&()).unwrap();
    clock.advance(Duration::minutes(9));
    f.call(&()).unwrap();

    assert_eq!(calls.get(), 2);
    assert_eq!(
        store.lookup(&f.key_for(&()).unwrap()).unwrap().expires_at,
        t0() + Duration::minutes(21)
    );
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_ttl_overflow_is_an_error() {
    let (_temp, _clock, store) = setup_temp_store();
    let calls = Cell::new(0);

    let f = store.cache_with(Expiry::AfterEachCall(Duration::MAX)).wrap("f", |_: &()| {
        calls.set(calls.get() + 1);
        Ok::<_, io::Error>(b"v".to_vec())
    });

    assert!(matches!(f.call(&()), Err(ZealotError::Config(_))));
    assert_eq!(calls.get(), 0);
    assert!(store.is_empty());
}

#[test]
fn test_nan_argument_is_rejected() {
    let (_temp, _clock, store) = setup_temp_store();
    let calls = Cell::new(0);

    let f = store.cache(t0() + Duration::minutes(10)).wrap("f", |x: &Option<f64>| {
        calls.set(calls.get() + 1);
        Ok::<_, io::Error>(format!("{:?}", x).into_bytes())
    });

    assert_eq!(f.call(&None).unwrap(), b"None".to_vec());
    assert!(matches!(f.call(&Some(f64::NAN)), Err(ZealotError::Serialization(_))));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_wrapped_error_propagates() {
    let (_temp, _clock, store) = setup_temp_store();

    let f = store
        .cache(t0() + Duration::minutes(10))
        .wrap("f", |_: &str| Err::<Vec<u8>, _>("no route to host"));

    let err = f.call("x").unwrap_err();

    assert!(matches!(err, ZealotError::Callback(_)));
    assert_eq!(err.to_string(), "Compute callback failed: no route to host");
    assert!(store.is_empty());
}
