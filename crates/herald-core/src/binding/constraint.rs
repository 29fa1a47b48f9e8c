//! Constraint - バインディングの適用条件
//!
//! # 学習ポイント
//! - タグ付き enum + 単一のマッチ関数（クロージャを束縛ごとに持たない）
//! - 修飾子（`Exact` / `Instant`）は包んで表現し、ディスパッチ時に剥がす

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use super::variance::Variance;
use crate::callback::Value;
use crate::error::{MediatorError, Result};
use crate::types::{self, TypeKey};

pub type PredicateFn = Arc<dyn Fn(&Constraint, Variance) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Constraint {
    /// Matches everything except invariant requests.
    Any,
    Type(TypeKey),
    Protocol(TypeKey),
    Name(String),
    Pattern(Regex),
    Predicate(PredicateFn),
    /// Forces invariant matching (`$eq`).
    Exact(Box<Constraint>),
    /// Refuses asynchronous results (`$instant`).
    Instant(Box<Constraint>),
}

/// Fast-path index key of a binding list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Type(TypeId),
    Name(String),
}

impl Constraint {
    /// `Protocol` when `T` is declared as a protocol, `Type` otherwise.
    pub fn of<T: Any + ?Sized>() -> Self {
        Self::of_key(TypeKey::of::<T>())
    }

    pub fn of_key(key: TypeKey) -> Self {
        if types::is_protocol(key) {
            Constraint::Protocol(key)
        } else {
            Constraint::Type(key)
        }
    }

    pub fn protocol<T: Any + ?Sized>() -> Result<Self> {
        let key = TypeKey::of::<T>();
        if !types::is_protocol(key) {
            return Err(MediatorError::InvalidProtocol(key.short_name()));
        }
        Ok(Constraint::Protocol(key))
    }

    /// The type of an instance, for "the constraint is itself a value" requests.
    pub fn of_value(value: &Value) -> Self {
        Self::of_key(types::classify_value(value))
    }

    pub fn name(name: impl Into<String>) -> Self {
        Constraint::Name(name.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Constraint::Pattern)
            .map_err(|e| MediatorError::InvalidPattern(e.to_string()))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Constraint, Variance) -> bool + Send + Sync + 'static,
    {
        Constraint::Predicate(Arc::new(f))
    }

    pub fn exact(self) -> Self {
        match self {
            Constraint::Exact(_) => self,
            other => Constraint::Exact(Box::new(other)),
        }
    }

    pub fn instant(self) -> Self {
        match self {
            Constraint::Instant(_) => self,
            other => Constraint::Instant(Box::new(other)),
        }
    }

    /// Strip modifiers, reporting `(constraint, invariant, instant)`.
    pub fn unwrap_modifiers(&self) -> (&Constraint, bool, bool) {
        let mut current = self;
        let mut invariant = false;
        let mut instant = false;
        loop {
            match current {
                Constraint::Exact(inner) => {
                    invariant = true;
                    current = inner;
                }
                Constraint::Instant(inner) => {
                    instant = true;
                    current = inner;
                }
                _ => return (current, invariant, instant),
            }
        }
    }

    pub fn is_instant(&self) -> bool {
        self.unwrap_modifiers().2
    }

    pub fn type_key(&self) -> Option<TypeKey> {
        match self.unwrap_modifiers().0 {
            Constraint::Type(key) | Constraint::Protocol(key) => Some(*key),
            _ => None,
        }
    }

    pub fn index(&self) -> Option<IndexKey> {
        match self.unwrap_modifiers().0 {
            Constraint::Type(key) | Constraint::Protocol(key) => Some(IndexKey::Type(key.id())),
            Constraint::Name(name) => Some(IndexKey::Name(name.to_lowercase())),
            _ => None,
        }
    }
}

/// Does a binding registered under `constraint` accept `candidate` under `variance`?
pub fn matches(constraint: &Constraint, candidate: &Constraint, variance: Variance) -> bool {
    let (candidate, forced, _) = candidate.unwrap_modifiers();
    let variance = if forced { Variance::Invariant } else { variance };
    match constraint {
        Constraint::Any => variance != Variance::Invariant,
        Constraint::Exact(inner) => exact(inner, candidate),
        Constraint::Instant(inner) => matches(inner, candidate, variance),
        Constraint::Protocol(protocol) => {
            let Some(other) = candidate.type_key() else {
                return false;
            };
            if *protocol == other {
                return true;
            }
            match variance {
                Variance::Covariant => {
                    types::is_protocol(other) && types::conforms_to(*protocol, other)
                }
                Variance::Contravariant => types::conforms_to(other, *protocol),
                Variance::Invariant => false,
            }
        }
        Constraint::Type(ty) => {
            let Some(other) = candidate.type_key() else {
                return false;
            };
            if *ty == other {
                return true;
            }
            match variance {
                Variance::Contravariant => types::is_subclass_of(other, *ty),
                Variance::Covariant => {
                    types::is_subclass_of(*ty, other)
                        || (types::is_protocol(other) && types::conforms_to(*ty, other))
                }
                Variance::Invariant => false,
            }
        }
        Constraint::Name(name) => match candidate {
            Constraint::Name(other) if variance == Variance::Invariant => name == other,
            Constraint::Name(other) => name.to_lowercase() == other.to_lowercase(),
            _ => false,
        },
        Constraint::Pattern(regex) => match candidate {
            Constraint::Name(other) => variance != Variance::Invariant && regex.is_match(other),
            _ => false,
        },
        Constraint::Predicate(predicate) => predicate(candidate, variance),
    }
}

/// Invariant-force bindings only accept the identical constraint.
pub fn exact(constraint: &Constraint, candidate: &Constraint) -> bool {
    !matches!(constraint, Constraint::Any) && constraint == candidate
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constraint::Any, Constraint::Any) => true,
            (
                Constraint::Type(a) | Constraint::Protocol(a),
                Constraint::Type(b) | Constraint::Protocol(b),
            ) => a == b,
            (Constraint::Name(a), Constraint::Name(b)) => a == b,
            (Constraint::Pattern(a), Constraint::Pattern(b)) => a.as_str() == b.as_str(),
            (Constraint::Predicate(a), Constraint::Predicate(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Constraint::Exact(a), Constraint::Exact(b)) => a == b,
            (Constraint::Instant(a), Constraint::Instant(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Any => f.write_str("*"),
            Constraint::Type(key) => write!(f, "{key}"),
            Constraint::Protocol(key) => write!(f, "<{key}>"),
            Constraint::Name(name) => write!(f, "{name:?}"),
            Constraint::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
            Constraint::Predicate(_) => f.write_str("fn(..)"),
            Constraint::Exact(inner) => write!(f, "$eq({inner:?})"),
            Constraint::Instant(inner) => write!(f, "$instant({inner:?})"),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<&str> for Constraint {
    fn from(name: &str) -> Self {
        Constraint::Name(name.to_string())
    }
}

impl From<String> for Constraint {
    fn from(name: String) -> Self {
        Constraint::Name(name)
    }
}

impl From<TypeKey> for Constraint {
    fn from(key: TypeKey) -> Self {
        Constraint::of_key(key)
    }
}

impl From<Regex> for Constraint {
    fn from(regex: Regex) -> Self {
        Constraint::Pattern(regex)
    }
}
