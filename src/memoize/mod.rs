//! Memoization Module
//!
//! Wraps a function so that calls with equal arguments are answered from
//! the datastore.
//!
//! ## Cache keys
//! ```text
//! <function name> <canonical JSON of the arguments>
//! get_html {"args":["https://example.com"],"kwargs":{"lang":"en"}}
//! ```
//! Object keys in the JSON are sorted at every depth, so keyword arguments
//! (struct fields, maps, [`CallArgs::kwarg`]) produce the same key whatever
//! order they were supplied in. NaN and infinite floats have no JSON form
//! and are rejected rather than collapsed into `null`.

mod finite;

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::clock::add_ttl;
use crate::datastore::Datastore;
use crate::error::{CallbackError, Result, ZealotError};

use finite::check_finite;

/// When values stored through a memoized function expire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// One absolute timestamp shared by every call through the wrapper.
    /// Once it passes, every call recomputes.
    At(DateTime<Utc>),

    /// `ttl` after the first call through the wrapper, then fixed
    AfterFirstCall(Duration),

    /// `ttl` after each call that stores a value
    AfterEachCall(Duration),
}

/// Positional and keyword arguments for key derivation
///
/// Keyword arguments are kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallArgs {
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg<T: Serialize>(mut self, value: T) -> Result<Self> {
        self.args.push(to_json(&value)?);
        Ok(self)
    }

    /// Set a keyword argument
    pub fn kwarg<T: Serialize>(mut self, name: impl Into<String>, value: T) -> Result<Self> {
        self.kwargs.insert(name.into(), to_json(&value)?);
        Ok(self)
    }

    pub fn positional(&self) -> &[Value] {
        &self.args
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }
}

/// Derive the cache key for calling `name` with `args`
pub fn derive_key<A: Serialize + ?Sized>(name: &str, args: &A) -> Result<String> {
    let value = canonicalize(to_json(args)?);
    Ok(format!("{} {}", name, value))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    check_finite(value).map_err(|e| ZealotError::Serialization(format!("cache key argument: {}", e)))?;
    Ok(serde_json::to_value(value)?)
}

/// Rebuild every object with its keys in sorted order
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in fields {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Factory for memoized functions sharing one datastore and expiry policy
///
/// Obtained from [`Datastore::cache`] or [`Datastore::cache_with`].
#[derive(Clone, Copy)]
pub struct Memoizer<'s> {
    store: &'s Datastore,
    expiry: Expiry,
}

impl<'s> Memoizer<'s> {
    pub(crate) fn new(store: &'s Datastore, expiry: Expiry) -> Self {
        Self { store, expiry }
    }

    /// Memoize `f` under the name `name`
    ///
    /// The name is part of every cache key, so two different functions must
    /// not share one.
    pub fn wrap<A, F, E>(&self, name: impl Into<String>, f: F) -> Memoized<'s, A, F>
    where
        A: Serialize + ?Sized,
        F: Fn(&A) -> std::result::Result<Vec<u8>, E>,
        E: Into<CallbackError>,
    {
        Memoized {
            store: self.store,
            name: name.into(),
            expiry: self.expiry,
            first_call: OnceLock::new(),
            f,
            _args: PhantomData,
        }
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }
}

impl fmt::Debug for Memoizer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("dir", &self.store.data_dir())
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// A function whose results are cached in a datastore
pub struct Memoized<'s, A: ?Sized, F> {
    store: &'s Datastore,
    name: String,
    expiry: Expiry,
    first_call: OnceLock<DateTime<Utc>>,
    f: F,
    _args: PhantomData<fn(&A)>,
}

impl<'s, A, F, E> Memoized<'s, A, F>
where
    A: Serialize + ?Sized,
    F: Fn(&A) -> std::result::Result<Vec<u8>, E>,
    E: Into<CallbackError>,
{
    /// Call the function through the cache
    pub fn call(&self, args: &A) -> Result<Vec<u8>> {
        let key = self.key_for(args)?;
        let expires_at = self.expires_at()?;
        self.store
            .get_or_compute(&key, expires_at, || (self.f)(args))
    }

    /// The cache key a call with `args` uses
    pub fn key_for(&self, args: &A) -> Result<String> {
        derive_key(&self.name, args)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expiry a call made now would store
    fn expires_at(&self) -> Result<DateTime<Utc>> {
        match self.expiry {
            Expiry::At(at) => Ok(at),
            Expiry::AfterFirstCall(ttl) => {
                if let Some(at) = self.first_call.get() {
                    return Ok(*at);
                }
                let at = add_ttl(self.store.now(), ttl)?;
                Ok(*self.first_call.get_or_init(|| at))
            }
            Expiry::AfterEachCall(ttl) => add_ttl(self.store.now(), ttl),
        }
    }
}
