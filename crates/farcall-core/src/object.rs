//! Objects that can be exposed and driven through a remote handle.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::RwLock;

use crate::error::{RemoteError, RemoteResult};
use crate::value::Value;

/// A local object reachable by a remote peer.
///
/// Only [`RemoteObject::get`] is required. Calls and constructions default to
/// looking the member up and invoking it, so an object whose members are
/// [`RemoteFn`]s and [`RemoteClass`]es works without further code.
#[async_trait]
pub trait RemoteObject: Send + Sync + 'static {
    /// Reads a member. Missing members read as `Null`.
    async fn get(&self, name: &str) -> RemoteResult<Value>;

    /// Assigns a member. Returns false when the assignment was refused.
    async fn set(&self, _name: &str, _value: Value) -> RemoteResult<bool> {
        Ok(false)
    }

    /// Calls member `name` with this object as the receiver.
    async fn call(&self, name: &str, args: Vec<Value>) -> RemoteResult<Value> {
        match self.get(name).await? {
            Value::Object(function) => function.invoke(args).await,
            other => Err(RemoteError::type_error(format!(
                "{name} is not a function (found {})",
                other.type_name()
            ))),
        }
    }

    /// Invokes this object as a function.
    async fn invoke(&self, _args: Vec<Value>) -> RemoteResult<Value> {
        Err(RemoteError::type_error("object is not a function"))
    }

    /// Instantiates member `name`.
    async fn construct(&self, name: &str, args: Vec<Value>) -> RemoteResult<Value> {
        match self.get(name).await? {
            Value::Object(class) => class.instantiate(args).await,
            other => Err(RemoteError::type_error(format!(
                "{name} is not a constructor (found {})",
                other.type_name()
            ))),
        }
    }

    /// Instantiates this object as a constructor.
    async fn instantiate(&self, _args: Vec<Value>) -> RemoteResult<Value> {
        Err(RemoteError::type_error("object is not a constructor"))
    }
}

type Callback = Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, RemoteResult<Value>> + Send + Sync>;

fn boxed<F, Fut>(f: F) -> Callback
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
{
    Box::new(move |args| f(args).boxed())
}

/// A callable closure.
pub struct RemoteFn {
    callback: Callback,
}

impl RemoteFn {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
    {
        Self { callback: boxed(f) }
    }

    /// Wraps a synchronous closure.
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> RemoteResult<Value> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |args| {
            let f = Arc::clone(&f);
            async move { f(args) }
        })
    }
}

#[async_trait]
impl RemoteObject for RemoteFn {
    async fn get(&self, _name: &str) -> RemoteResult<Value> {
        Ok(Value::Null)
    }

    async fn invoke(&self, args: Vec<Value>) -> RemoteResult<Value> {
        (self.callback)(args).await
    }
}

/// A constructor closure. Its result is always exposed by reference.
pub struct RemoteClass {
    callback: Callback,
}

impl RemoteClass {
    /// Wraps a synchronous constructor.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> RemoteResult<Value> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self {
            callback: boxed(move |args| {
                let f = Arc::clone(&f);
                async move { f(args) }
            }),
        }
    }
}

#[async_trait]
impl RemoteObject for RemoteClass {
    async fn get(&self, _name: &str) -> RemoteResult<Value> {
        Ok(Value::Null)
    }

    async fn instantiate(&self, args: Vec<Value>) -> RemoteResult<Value> {
        (self.callback)(args).await
    }
}

/// An object literal: named members, any of which may be functions, nested
/// objects or constructors.
///
/// ```ignore
/// let math = DynObject::new()
///     .with_property("version", 1)
///     .with_method("add", |args| {
///         let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
///         Ok(sum.into())
///     });
/// ```
#[derive(Default)]
pub struct DynObject {
    members: RwLock<BTreeMap<String, Value>>,
}

impl DynObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a data member.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.get_mut().insert(name.into(), value.into());
        self
    }

    /// Builder: add a synchronous method.
    #[must_use]
    pub fn with_method<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> RemoteResult<Value> + Send + Sync + 'static,
    {
        self.with_object(name, RemoteFn::from_sync(f))
    }

    /// Builder: add an async method.
    #[must_use]
    pub fn with_async_method<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
    {
        self.with_object(name, RemoteFn::new(f))
    }

    /// Builder: add a nested object.
    #[must_use]
    pub fn with_object(mut self, name: impl Into<String>, object: impl RemoteObject) -> Self {
        self.members
            .get_mut()
            .insert(name.into(), Value::object(object));
        self
    }

    /// Builder: add a constructor.
    #[must_use]
    pub fn with_constructor<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> RemoteResult<Value> + Send + Sync + 'static,
    {
        self.with_object(name, RemoteClass::new(f))
    }

    /// Current value of a member.
    pub async fn property(&self, name: &str) -> Option<Value> {
        self.members.read().await.get(name).cloned()
    }
}

#[async_trait]
impl RemoteObject for DynObject {
    async fn get(&self, name: &str) -> RemoteResult<Value> {
        Ok(self.property(name).await.unwrap_or_default())
    }

    async fn set(&self, name: &str, value: Value) -> RemoteResult<bool> {
        self.members.write().await.insert(name.to_string(), value);
        Ok(true)
    }
}

impl From<DynObject> for Value {
    fn from(object: DynObject) -> Self {
        Value::object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> DynObject {
        DynObject::new()
            .with_property("version", 2)
            .with_method("add", |args| {
                Ok(args.iter().filter_map(Value::as_i64).sum::<i64>().into())
            })
            .with_async_method("echo", |mut args| async move { Ok(args.pop().unwrap_or_default()) })
            .with_constructor("Point", |args| {
                Ok(Value::map([("x", args.first().cloned().unwrap_or_default())]))
            })
    }

    #[tokio::test]
    async fn calls_methods_by_name() {
        let calc = calculator();
        let sum = calc.call("add", vec![2.into(), 3.into()]).await.unwrap();
        assert_eq!(sum, Value::from(5));

        let echoed = calc.call("echo", vec!["hi".into()]).await.unwrap();
        assert_eq!(echoed, Value::from("hi"));
    }

    #[tokio::test]
    async fn calling_data_is_a_type_error() {
        let calc = calculator();
        let result = calc.call("version", Vec::new()).await;
        assert!(matches!(result, Err(RemoteError::Type(_))));
    }

    #[tokio::test]
    async fn missing_members_read_as_null() {
        let calc = calculator();
        assert!(calc.get("nope").await.unwrap().is_null());
    }

    #[tokio::test]
    async fn set_updates_members() {
        let calc = calculator();
        assert!(calc.set("version", 3.into()).await.unwrap());
        assert_eq!(calc.property("version").await, Some(Value::from(3)));
    }

    #[tokio::test]
    async fn constructs_instances() {
        let calc = calculator();
        let point = calc.construct("Point", vec![4.into()]).await.unwrap();
        assert_eq!(point, Value::map([("x", 4)]));

        let result = calc.construct("add", Vec::new()).await;
        assert!(matches!(result, Err(RemoteError::Type(_))));
    }
}
