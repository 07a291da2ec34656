//! The object served by `farcall serve`.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use farcall_core::{DynObject, RemoteError, RemoteObject, RemoteResult, Value};

/// Builds the demo object.
///
/// Members: `add`, `multiply`, `echo`, a settable `counter`, a nested
/// `math.square`, and a `Counter` constructor.
pub fn demo_object() -> DynObject {
    DynObject::new()
        .with_property("version", env!("CARGO_PKG_VERSION"))
        .with_property("counter", 0)
        .with_method("add", |args| Ok(Value::from(sum(&args)?)))
        .with_method("multiply", |args| {
            numbers(&args)?
                .into_iter()
                .try_fold(1i64, |acc, n| acc.checked_mul(n))
                .map(Value::from)
                .ok_or_else(|| RemoteError::failed("multiplication overflowed"))
        })
        .with_method("echo", |args| {
            Ok(match <[Value; 1]>::try_from(args) {
                Ok([single]) => single,
                Err(args) => Value::List(args),
            })
        })
        .with_object(
            "math",
            DynObject::new().with_method("square", |args| {
                let n = numbers(&args)?.first().copied().unwrap_or_default();
                n.checked_mul(n)
                    .map(Value::from)
                    .ok_or_else(|| RemoteError::failed("square overflowed"))
            }),
        )
        .with_constructor("Counter", |args| {
            let start = args.first().and_then(Value::as_i64).unwrap_or_default();
            Ok(Value::object(Counter::new(start)))
        })
}

fn numbers(args: &[Value]) -> RemoteResult<Vec<i64>> {
    args.iter()
        .map(|arg| {
            arg.as_i64().ok_or_else(|| {
                RemoteError::type_error(format!("expected an integer, got {}", arg.type_name()))
            })
        })
        .collect()
}

fn sum(args: &[Value]) -> RemoteResult<i64> {
    numbers(args)?
        .into_iter()
        .try_fold(0i64, i64::checked_add)
        .ok_or_else(|| RemoteError::failed("addition overflowed"))
}

/// Instance created by the `Counter` constructor.
pub struct Counter {
    n: Arc<AtomicI64>,
}

impl Counter {
    pub fn new(start: i64) -> Self {
        Self {
            n: Arc::new(AtomicI64::new(start)),
        }
    }
}

#[async_trait]
impl RemoteObject for Counter {
    async fn get(&self, name: &str) -> RemoteResult<Value> {
        match name {
            "n" => Ok(self.n.load(Ordering::SeqCst).into()),
            _ => Ok(Value::Null),
        }
    }

    async fn set(&self, name: &str, value: Value) -> RemoteResult<bool> {
        match (name, value.as_i64()) {
            ("n", Some(n)) => {
                self.n.store(n, Ordering::SeqCst);
                Ok(true)
            }
            ("n", None) => Err(RemoteError::type_error(format!(
                "n must be an integer, got {}",
                value.type_name()
            ))),
            _ => Ok(false),
        }
    }

    async fn call(&self, name: &str, args: Vec<Value>) -> RemoteResult<Value> {
        match name {
            "increment" => {
                let by = args.first().and_then(Value::as_i64).unwrap_or(1);
                Ok(self.n.fetch_add(by, Ordering::SeqCst).wrapping_add(by).into())
            }
            "reset" => {
                self.n.store(0, Ordering::SeqCst);
                Ok(Value::Null)
            }
            other => Err(RemoteError::type_error(format!("{other} is not a function"))),
        }
    }
}
