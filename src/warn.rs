//! Warning sinks for tolerant parsing.
//!
//! Engine output is best-effort text: a malformed token must never abort the
//! stream, but it should still be reported somewhere. Parsers take a
//! `&mut impl Sink<E>` and push recoverable problems into it instead of
//! returning `Err`.

use std::error::Error;
use std::marker::PhantomData;

pub trait Sink<E: Error> {
    fn warn(&mut self, error: E);
}

/// Discards all warnings.
#[derive(Debug)]
pub struct Ignore;

impl<E: Error> Sink<E> for Ignore {
    #[inline]
    fn warn(&mut self, _error: E) {}
}

/// Collects every warning, in order.
#[derive(Debug)]
pub struct All<E: Error>(pub Vec<E>);

impl<E: Error> Default for All<E> {
    #[inline]
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<E: Error> Sink<E> for All<E> {
    #[inline]
    fn warn(&mut self, error: E) {
        self.0.push(error);
    }
}

/// Keeps only the first warning.
#[derive(Debug)]
pub struct First<E: Error>(pub Option<E>);

impl<E: Error> Default for First<E> {
    #[inline]
    fn default() -> Self {
        Self(None)
    }
}

impl<E: Error> Sink<E> for First<E> {
    #[inline]
    fn warn(&mut self, error: E) {
        if self.0.is_none() {
            self.0 = Some(error);
        }
    }
}

pub struct FromFn<E: Error, F: FnMut(E)>(F, PhantomData<E>);

/// Builds a sink from a closure, e.g. one that forwards into `tracing`.
#[inline]
pub fn from_fn<E: Error, F: FnMut(E)>(func: F) -> FromFn<E, F> {
    FromFn(func, PhantomData)
}

impl<E: Error, F: FnMut(E)> Sink<E> for FromFn<E, F> {
    #[inline]
    fn warn(&mut self, error: E) {
        self.0(error)
    }
}

pub trait OptionExt<T> {
    fn or_warn_with<E: Error>(self, error: E, warn: &mut impl Sink<E>) -> Option<T>;
}

impl<T> OptionExt<T> for Option<T> {
    #[inline]
    fn or_warn_with<E: Error>(self, error: E, warn: &mut impl Sink<E>) -> Option<T> {
        if self.is_none() {
            warn.warn(error);
        }
        self
    }
}

pub trait ResultExt<T, E: Error> {
    fn or_warn(self, warn: &mut impl Sink<E>) -> Option<T>;

    fn or_warn_map<F, M>(self, map: M, warn: &mut impl Sink<F>) -> Option<T>
    where
        F: Error,
        M: FnOnce(E) -> F;
}

impl<T, E: Error> ResultExt<T, E> for Result<T, E> {
    #[inline]
    fn or_warn(self, warn: &mut impl Sink<E>) -> Option<T> {
        self.or_warn_map(|e| e, warn)
    }

    #[inline]
    fn or_warn_map<F, M>(self, map: M, warn: &mut impl Sink<F>) -> Option<T>
    where
        F: Error,
        M: FnOnce(E) -> F,
    {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                warn.warn(map(error));
                None
            }
        }
    }
}
