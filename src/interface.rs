//! Registration-time structural check of algorithm plugins.
//!
//! An interface is a base tag plus an ordered set of required methods, each with
//! its exact positional parameter list (including the leading `self`). A plugin
//! describes itself with a [`ClassSpec`]; [`assert_implements`] rejects it if it is
//! not tagged with the base, omits a method, or declares a method with a
//! different parameter list.

use crate::errors::InterfaceError;

/// One required method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodSig {
    pub name: &'static str,
    pub params: &'static [&'static str],
}

impl MethodSig {
    /// e.g. `(self, init_cwnd, mss)`
    pub fn render(&self) -> String {
        format!("({})", self.params.join(", "))
    }
}

/// A required interface. Immutable for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlgorithmDescriptor {
    pub base: &'static str,
    pub methods: &'static [MethodSig],
}

impl AlgorithmDescriptor {
    pub fn signature(&self, method: &str) -> Option<&MethodSig> {
        self.methods.iter().find(|m| m.name == method)
    }
}

/// The algorithm factory interface.
pub const ALG_BASE: AlgorithmDescriptor = AlgorithmDescriptor {
    base: "AlgBase",
    methods: &[MethodSig {
        name: "new_flow",
        params: &["self", "init_cwnd", "mss"],
    }],
};

/// The per-flow interface.
pub const FLOW_BASE: AlgorithmDescriptor = AlgorithmDescriptor {
    base: "FlowBase",
    methods: &[
        MethodSig {
            name: "curr_cwnd",
            params: &["self"],
        },
        MethodSig {
            name: "set_cwnd",
            params: &["self", "cwnd"],
        },
        MethodSig {
            name: "increase",
            params: &["self", "m"],
        },
        MethodSig {
            name: "reduction",
            params: &["self", "m"],
        },
        MethodSig {
            name: "reset",
            params: &["self"],
        },
    ],
};

/// The declared surface of a plugin class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassSpec {
    name: String,
    bases: Vec<String>,
    methods: Vec<(String, Vec<String>)>,
}

impl ClassSpec {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ClassSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A class which declares exactly what `iface` requires.
    pub fn conforming<S: Into<String>>(name: S, iface: &AlgorithmDescriptor) -> Self {
        iface.methods.iter().fold(
            ClassSpec::new(name).subclass_of(iface.base),
            |cls, m| cls.method(m.name, m.params),
        )
    }

    pub fn subclass_of(mut self, base: &str) -> Self {
        if !self.is_subclass_of(base) {
            self.bases.push(base.to_owned());
        }

        self
    }

    /// Declare a method. A later declaration of the same name replaces the earlier one.
    pub fn method(mut self, name: &str, params: &[&str]) -> Self {
        let params = params.iter().map(|p| (*p).to_owned()).collect();
        match self.methods.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = params,
            None => self.methods.push((name.to_owned(), params)),
        }

        self
    }

    /// Remove a declared method.
    pub fn without(mut self, name: &str) -> Self {
        self.methods.retain(|(n, _)| n != name);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_subclass_of(&self, base: &str) -> bool {
        self.bases.iter().any(|b| b == base)
    }

    pub fn params(&self, method: &str) -> Option<&[String]> {
        self.methods
            .iter()
            .find(|(n, _)| n == method)
            .map(|(_, p)| &p[..])
    }
}

/// Check `class` against `iface`. Methods are checked in the interface's order,
/// so the first violation reported is deterministic.
pub fn assert_implements(
    class: &ClassSpec,
    iface: &AlgorithmDescriptor,
) -> Result<(), InterfaceError> {
    if !class.is_subclass_of(iface.base) {
        return Err(InterfaceError::NotSubclass {
            class: class.name.clone(),
            base: iface.base.to_owned(),
        });
    }

    for required in iface.methods {
        let declared = class
            .params(required.name)
            .ok_or_else(|| InterfaceError::MissingMethod {
                class: class.name.clone(),
                method: required.name.to_owned(),
            })?;

        if declared.len() != required.params.len()
            || declared.iter().zip(required.params).any(|(d, r)| d != r)
        {
            return Err(InterfaceError::SignatureMismatch {
                class: class.name.clone(),
                method: required.name.to_owned(),
                expected: required.render(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{assert_implements, ClassSpec, ALG_BASE, FLOW_BASE};
    use crate::errors::InterfaceError;

    #[test]
    fn conforming_classes_pass() {
        assert_implements(&ClassSpec::conforming("Reno", &ALG_BASE), &ALG_BASE)
            .expect("alg conforms");
        assert_implements(&ClassSpec::conforming("RenoFlow", &FLOW_BASE), &FLOW_BASE)
            .expect("flow conforms");
    }

    #[test]
    fn extra_methods_are_allowed() {
        let cls = ClassSpec::conforming("Reno", &ALG_BASE).method("describe", &["self"]);
        assert_implements(&cls, &ALG_BASE).expect("extra methods are fine");
    }

    #[test]
    fn untagged_class_is_rejected() {
        let cls = ClassSpec::new("Reno").method("new_flow", &["self", "init_cwnd", "mss"]);
        assert_eq!(
            assert_implements(&cls, &ALG_BASE),
            Err(InterfaceError::NotSubclass {
                class: String::from("Reno"),
                base: String::from("AlgBase"),
            })
        );
    }

    #[test]
    fn every_missing_flow_method_is_named() {
        for required in FLOW_BASE.methods {
            let cls = ClassSpec::conforming("F", &FLOW_BASE).without(required.name);
            let err = assert_implements(&cls, &FLOW_BASE).expect_err("missing method");
            assert_eq!(
                err,
                InterfaceError::MissingMethod {
                    class: String::from("F"),
                    method: required.name.to_owned(),
                }
            );
            assert!(err.to_string().contains(required.name));
        }
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let cls = ClassSpec::conforming("Reno", &ALG_BASE).method("new_flow", &["self", "init_cwnd"]);
        let err = assert_implements(&cls, &ALG_BASE).expect_err("arity mismatch");
        assert_eq!(
            err,
            InterfaceError::SignatureMismatch {
                class: String::from("Reno"),
                method: String::from("new_flow"),
                expected: String::from("(self, init_cwnd, mss)"),
            }
        );
    }

    #[test]
    fn every_flow_arity_mismatch_is_rejected() {
        for required in FLOW_BASE.methods {
            let mut params = required.params.to_vec();
            params.push("extra");
            let cls = ClassSpec::conforming("F", &FLOW_BASE).method(required.name, &params);
            match assert_implements(&cls, &FLOW_BASE) {
                Err(InterfaceError::SignatureMismatch { method, expected, .. }) => {
                    assert_eq!(method, required.name);
                    assert_eq!(expected, required.render());
                }
                x => panic!("expected signature mismatch for {}, got {:?}", required.name, x),
            }
        }
    }

    #[test]
    fn parameter_order_matters() {
        let cls = ClassSpec::conforming("Reno", &ALG_BASE).method("new_flow", &["self", "mss", "init_cwnd"]);
        assert!(matches!(
            assert_implements(&cls, &ALG_BASE),
            Err(InterfaceError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn missing_self_is_rejected() {
        let cls = ClassSpec::conforming("F", &FLOW_BASE).method("curr_cwnd", &[]);
        assert!(matches!(
            assert_implements(&cls, &FLOW_BASE),
            Err(InterfaceError::SignatureMismatch { .. })
        ));
    }
}
