// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! State-gated methods and their argument descriptors.
//!
//! Arguments are registered explicitly on a [`MethodBuilder`]. An argument
//! declared with [`MethodBuilder::arg`] takes its type and descriptor from
//! the device attribute of the same name, and that attribute is tagged with
//! the method name. A proxy method (`proxy_of`) starts from another
//! method's arguments and appends its own.

use super::{Attributes, Device, StateName, States, VType};
use crate::codec::wire::{AttributeWire, MethodWire};
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Tag carried by arguments without a default.
pub const REQUIRED_TAG: &str = "required";

/// Outcome of a method body: an optional return value.
pub type MethodResult = Result<Option<Value>>;

/// Boxed future returned by method bodies.
pub type MethodFuture = BoxFuture<'static, MethodResult>;

type Body = Arc<dyn Fn(Arc<Device>, Args) -> MethodFuture + Send + Sync>;

/// Checked call arguments, with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Map<String, Value>,
}

impl Args {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    fn require(&self, name: &str) -> Result<&Value> {
        match self.values.get(name) {
            Some(Value::Null) | None => {
                Err(Error::InvalidArgs(format!("Argument {} has no value", name)))
            }
            Some(value) => Ok(value),
        }
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| Error::InvalidArgs(format!("Argument {} is not an int", name)))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| Error::InvalidArgs(format!("Argument {} is not a number", name)))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| Error::InvalidArgs(format!("Argument {} is not a string", name)))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.require(name)?
            .as_bool()
            .ok_or_else(|| Error::InvalidArgs(format!("Argument {} is not a bool", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

/// Attribute-shaped description of one argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgDescriptor {
    pub name: String,
    pub typ: VType,
    pub descriptor: String,
    /// Default value, `null` when the argument is required.
    pub default: Value,
    pub tags: Vec<String>,
}

impl ArgDescriptor {
    pub fn is_required(&self) -> bool {
        self.tags.iter().any(|t| t == REQUIRED_TAG)
    }
}

impl Serialize for ArgDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        AttributeWire {
            value: &self.default,
            typ: &self.typ,
            tags: &self.tags,
            descriptor: &self.descriptor,
            alarm: None,
            time_stamp: None,
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone)]
enum ArgSpec {
    Attribute {
        name: String,
        default: Option<Value>,
    },
    Typed {
        name: String,
        typ: VType,
        descriptor: String,
        default: Option<Value>,
    },
}

/// Declares a method for [`DeviceBuilder::method`](super::DeviceBuilder::method).
pub struct MethodBuilder {
    name: String,
    descriptor: String,
    valid_states: Option<Vec<String>>,
    args: Vec<ArgSpec>,
    proxy_of: Option<String>,
    body: Body,
}

impl MethodBuilder {
    pub fn descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    /// Restrict calls to the given states. Without this the method is ungated.
    pub fn valid_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: StateName,
    {
        self.valid_states = Some(
            states
                .into_iter()
                .map(|s| s.state_name().to_string())
                .collect(),
        );
        self
    }

    /// Required argument backed by the attribute `name`.
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.args.push(ArgSpec::Attribute {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Optional argument backed by the attribute `name`.
    pub fn arg_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.args.push(ArgSpec::Attribute {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    /// Argument with no backing attribute.
    pub fn typed_arg(
        mut self,
        name: impl Into<String>,
        typ: VType,
        descriptor: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        self.args.push(ArgSpec::Typed {
            name: name.into(),
            typ,
            descriptor: descriptor.into(),
            default,
        });
        self
    }

    /// Inherit the arguments of method `other`, then append this one's.
    pub fn proxy_of(mut self, other: impl Into<String>) -> Self {
        self.proxy_of = Some(other.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve this method's own argument list against the device attributes.
    pub(crate) fn own_args(&self, attributes: &Attributes) -> Result<Vec<ArgDescriptor>> {
        let mut resolved = Vec::with_capacity(self.args.len());
        for spec in &self.args {
            let (name, typ, descriptor, default) = match spec {
                ArgSpec::Attribute { name, default } => {
                    let attribute = attributes.get(name).ok_or_else(|| {
                        Error::Config(format!(
                            "Method {} argument {} has no matching attribute",
                            self.name, name
                        ))
                    })?;
                    attribute.add_tag(&self.name);
                    (
                        name,
                        attribute.typ().clone(),
                        attribute.descriptor().to_string(),
                        default,
                    )
                }
                ArgSpec::Typed {
                    name,
                    typ,
                    descriptor,
                    default,
                } => (name, typ.clone(), descriptor.clone(), default),
            };

            if resolved.iter().any(|a: &ArgDescriptor| &a.name == name) {
                return Err(Error::Config(format!(
                    "Duplicate argument {} in {}",
                    name, self.name
                )));
            }

            let (default, tags) = match default {
                Some(value) => (
                    typ.validate(value).map_err(|e| {
                        Error::Config(format!(
                            "Default for {} in {}: {}",
                            name, self.name, e
                        ))
                    })?,
                    Vec::new(),
                ),
                None => (Value::Null, vec![REQUIRED_TAG.to_string()]),
            };

            resolved.push(ArgDescriptor {
                name: name.clone(),
                typ,
                descriptor,
                default,
                tags,
            });
        }
        Ok(resolved)
    }

    /// Finish the method once every method's own arguments are known.
    pub(crate) fn finish(
        self,
        states: &States,
        own_args: &HashMap<String, Vec<ArgDescriptor>>,
    ) -> Result<Method> {
        let mine = own_args.get(&self.name).cloned().unwrap_or_default();
        let args = match &self.proxy_of {
            Some(other) => {
                let mut inherited = own_args.get(other).cloned().ok_or_else(|| {
                    Error::Config(format!(
                        "Method {} is a proxy of unknown method {}",
                        self.name, other
                    ))
                })?;
                for arg in mine {
                    if inherited.iter().any(|a| a.name == arg.name) {
                        return Err(Error::Config(format!(
                            "Duplicate argument {} in {}",
                            arg.name, self.name
                        )));
                    }
                    inherited.push(arg);
                }
                inherited
            }
            None => mine,
        };

        let gate = match &self.valid_states {
            Some(names) => Some(
                names
                    .iter()
                    .map(|n| states.index_of(n.as_str()))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        Ok(Method {
            name: self.name,
            descriptor: self.descriptor,
            args,
            valid_states: self.valid_states,
            gate,
            proxy_of: self.proxy_of,
            body: self.body,
        })
    }
}

/// A callable exported over RPC.
pub struct Method {
    name: String,
    descriptor: String,
    args: Vec<ArgDescriptor>,
    valid_states: Option<Vec<String>>,
    gate: Option<Vec<usize>>,
    proxy_of: Option<String>,
    body: Body,
}

impl Method {
    /// Start declaring a method whose body is an async closure.
    pub fn builder<F, Fut>(name: impl Into<String>, body: F) -> MethodBuilder
    where
        F: Fn(Arc<Device>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        MethodBuilder {
            name: name.into(),
            descriptor: String::new(),
            valid_states: None,
            args: Vec::new(),
            proxy_of: None,
            body: Arc::new(move |device, args| body(device, args).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn args(&self) -> &[ArgDescriptor] {
        &self.args
    }

    /// Names of the states the method may run from; `None` when ungated.
    pub fn valid_states(&self) -> Option<&[String]> {
        self.valid_states.as_deref()
    }

    pub fn proxy_of(&self) -> Option<&str> {
        self.proxy_of.as_deref()
    }

    /// Whether a call is admissible from the state at `index`.
    pub fn allows(&self, index: usize) -> bool {
        match &self.gate {
            Some(gate) => gate.contains(&index),
            None => true,
        }
    }

    /// Check supplied arguments and fill in defaults.
    pub fn check_args(&self, supplied: Option<Map<String, Value>>) -> Result<Args> {
        let mut supplied = supplied.unwrap_or_default();

        let missing: Vec<&str> = self
            .args
            .iter()
            .filter(|a| a.is_required() && !supplied.contains_key(&a.name))
            .map(|a| a.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidArgs(format!(
                "Arguments not supplied: {:?}",
                missing
            )));
        }

        let mut extras: Vec<&str> = supplied
            .keys()
            .filter(|k| !self.args.iter().any(|a| &a.name == *k))
            .map(String::as_str)
            .collect();
        if !extras.is_empty() {
            extras.sort_unstable();
            return Err(Error::InvalidArgs(format!(
                "Unknown arguments supplied: {:?}",
                extras
            )));
        }

        let mut values = Map::new();
        for arg in &self.args {
            let value = match supplied.remove(&arg.name) {
                Some(value) => arg.typ.validate(&value).map_err(|e| {
                    Error::InvalidArgs(format!("Argument {}: {}", arg.name, e))
                })?,
                None => arg.default.clone(),
            };
            values.insert(arg.name.clone(), value);
        }
        Ok(Args { values })
    }

    pub(crate) fn invoke(&self, device: Arc<Device>, args: Args) -> MethodFuture {
        (self.body)(device, args)
    }
}

struct ArgsMap<'a>(&'a [ArgDescriptor]);

impl Serialize for ArgsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for arg in self.0 {
            map.serialize_entry(&arg.name, arg)?;
        }
        map.end()
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        MethodWire {
            descriptor: &self.descriptor,
            args: ArgsMap(&self.args),
            valid_states: self.valid_states.as_deref(),
        }
        .serialize(serializer)
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("args", &self.args.iter().map(|a| &a.name).collect::<Vec<_>>())
            .field("valid_states", &self.valid_states)
            .field("proxy_of", &self.proxy_of)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attribute, DState};
    use serde_json::json;

    fn noop(name: &str) -> MethodBuilder {
        Method::builder(name, |_device, _args| async { Ok(None) })
    }

    fn dummy_attributes() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.add("foo", Attribute::new(VType::Int, "foodesc")).unwrap();
        attrs.add("bar", Attribute::new(VType::Str, "bardesc")).unwrap();
        attrs
    }

    fn finish_one(builder: MethodBuilder, attrs: &Attributes) -> Result<Method> {
        let mut own = HashMap::new();
        own.insert(builder.name().to_string(), builder.own_args(attrs)?);
        builder.finish(&DState::states(), &own)
    }

    #[test]
    fn test_ad_hoc_method_descriptor() {
        let attrs = dummy_attributes();
        let method = finish_one(
            noop("f").descriptor("Hello").arg("foo").arg_default("bar", "bat"),
            &attrs,
        )
        .unwrap();

        assert_eq!(
            serde_json::to_string(&method).unwrap(),
            concat!(
                r#"{"descriptor":"Hello","args":{"#,
                r#""foo":{"value":null,"type":"int","tags":["required"],"descriptor":"foodesc"},"#,
                r#""bar":{"value":"bat","type":"str","descriptor":"bardesc"}}}"#
            )
        );
        assert_eq!(attrs.get("foo").unwrap().tags(), vec!["f".to_string()]);
    }

    #[test]
    fn test_valid_states_serialized() {
        let attrs = dummy_attributes();
        let method = finish_one(
            noop("run")
                .descriptor("Start a scan running")
                .valid_states(DState::runnable()),
            &attrs,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&method).unwrap(),
            json!({"descriptor": "Start a scan running", "args": {}, "valid_states": ["Ready", "Paused"]})
        );
        assert!(method.allows(3));
        assert!(!method.allows(1));
    }

    #[test]
    fn test_unknown_state_in_gate() {
        let attrs = dummy_attributes();
        let result = finish_one(noop("x").valid_states(["Flying"]), &attrs);
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_missing_attribute_for_arg() {
        let attrs = dummy_attributes();
        assert!(matches!(
            finish_one(noop("x").arg("nope"), &attrs),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_check_args() {
        let attrs = dummy_attributes();
        let method = finish_one(noop("f").arg("foo").arg_default("bar", "bat"), &attrs).unwrap();

        let err = method.check_args(None).unwrap_err();
        assert_eq!(err.to_string(), r#"Arguments not supplied: ["foo"]"#);

        let mut supplied = Map::new();
        supplied.insert("foo".into(), json!(1));
        supplied.insert("zed".into(), json!(2));
        supplied.insert("baz".into(), json!(2));
        let err = method.check_args(Some(supplied)).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Unknown arguments supplied: ["baz", "zed"]"#
        );

        let mut supplied = Map::new();
        supplied.insert("foo".into(), json!("one"));
        assert!(matches!(
            method.check_args(Some(supplied)),
            Err(Error::InvalidArgs(_))
        ));

        let mut supplied = Map::new();
        supplied.insert("foo".into(), json!(4));
        let args = method.check_args(Some(supplied)).unwrap();
        assert_eq!(args.i64("foo").unwrap(), 4);
        assert_eq!(args.str("bar").unwrap(), "bat");
    }

    #[test]
    fn test_proxy_inherits_args() {
        let attrs = dummy_attributes();
        let validate = noop("validate").arg("foo");
        let configure = noop("configure")
            .proxy_of("validate")
            .typed_arg("extra", VType::Bool, "extra flag", Some(json!(false)));

        let mut own = HashMap::new();
        own.insert("validate".to_string(), validate.own_args(&attrs).unwrap());
        own.insert("configure".to_string(), configure.own_args(&attrs).unwrap());
        let configure = configure.finish(&DState::states(), &own).unwrap();

        let names: Vec<&str> = configure.args().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["foo", "extra"]);
        assert_eq!(configure.proxy_of(), Some("validate"));
    }

    #[test]
    fn test_proxy_duplicate_rejected() {
        let attrs = dummy_attributes();
        let validate = noop("validate").arg("foo");
        let configure = noop("configure").proxy_of("validate").arg("foo");

        let mut own = HashMap::new();
        own.insert("validate".to_string(), validate.own_args(&attrs).unwrap());
        own.insert("configure".to_string(), configure.own_args(&attrs).unwrap());
        assert!(configure.finish(&DState::states(), &own).is_err());
    }
}
