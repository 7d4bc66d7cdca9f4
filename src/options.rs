//! Middleware options and their validation.
//!
//! Options are raw builders; [`ServiceOptions::validate`] and [`WindowOptions::validate`] turn
//! them into immutable configs or a [`ConfigError`] naming the first offending field. The
//! order of checks is fixed:
//!
//! binding → prefix → limit → period → interval → interval vs period → key generator.
//!
//! Numeric fields accept anything convertible into [`RawNumber`]. A value that does not read
//! as a finite number fails exactly like an out-of-range one. Values that pass the range check
//! are truncated toward zero.

use crate::binding::{Binding, BindingRef};
use crate::clock::{Clock, SystemClock};
use crate::context::RequestContext;
use crate::counter::{FixedWindow, WindowCounter, WindowPolicy};
use crate::error::Rejection;
use crate::handlers::{
    self, ServiceErrorHandler, ServiceSuccessHandler, WindowErrorHandler, WindowSuccessHandler,
};
use crate::key::KeyGenerator;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Prefix prepended to every window-counter storage key unless configured.
pub const DEFAULT_PREFIX: &str = "rl:";
/// Smallest allowed window, in seconds.
pub const MIN_PERIOD_SECS: u64 = 60;

/// A numeric option as supplied by the caller, before coercion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(untagged))]
pub enum RawNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    /// Read as a finite float, or `None` if the input is not a number.
    pub fn coerce(&self) -> Option<f64> {
        let value = match self {
            RawNumber::Int(v) => *v as f64,
            RawNumber::Float(v) => *v,
            RawNumber::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for RawNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawNumber::Int(v) => write!(f, "{}", v),
            RawNumber::Float(v) => write!(f, "{}", v),
            RawNumber::Text(s) => write!(f, "{:?}", s),
        }
    }
}

macro_rules! raw_number_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for RawNumber {
            fn from(v: $t) -> Self {
                match i64::try_from(v) {
                    Ok(v) => RawNumber::Int(v),
                    Err(_) => RawNumber::Float(v as f64),
                }
            }
        })*
    };
}

raw_number_from_int!(i32, i64, u32, u64, usize);

impl From<f64> for RawNumber {
    fn from(v: f64) -> Self {
        RawNumber::Float(v)
    }
}

impl From<&str> for RawNumber {
    fn from(v: &str) -> Self {
        RawNumber::Text(v.to_string())
    }
}

impl From<String> for RawNumber {
    fn from(v: String) -> Self {
        RawNumber::Text(v)
    }
}

/// Errors produced while validating middleware options.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("binding is required: provide a binding name or a factory")]
    MissingBinding,
    #[error("binding name must be a non-empty string")]
    EmptyBindingName,
    #[error("prefix must be a non-empty string")]
    EmptyPrefix,
    #[error("limit must be a number >= 1 (got {provided})")]
    InvalidLimit { provided: String },
    #[error("period must be a number of seconds >= 60 (got {provided})")]
    InvalidPeriod { provided: String },
    #[error("interval must be a number of seconds >= 0 (got {provided})")]
    InvalidInterval { provided: String },
    #[error("interval ({interval}s) must not exceed period ({period}s)")]
    IntervalExceedsPeriod { interval: u64, period: u64 },
    #[error("key_generator is required")]
    MissingKeyGenerator,
}

fn provided(raw: Option<&RawNumber>) -> String {
    raw.map_or_else(|| "nothing".to_string(), ToString::to_string)
}

fn validate_binding(binding: Option<BindingRef>) -> Result<BindingRef, ConfigError> {
    match binding {
        None => Err(ConfigError::MissingBinding),
        Some(BindingRef::Named(name)) if name.is_empty() => Err(ConfigError::EmptyBindingName),
        Some(binding) => Ok(binding),
    }
}

/// Coerce `raw` and keep it only if it is at least `min`.
fn at_least(raw: Option<&RawNumber>, min: f64) -> Option<u64> {
    let value = raw?.coerce()?;
    (value >= min).then(|| value.trunc() as u64)
}

/// Raw options for the service-backed strategy.
#[derive(Default)]
pub struct ServiceOptions {
    binding: Option<BindingRef>,
    key_generator: Option<KeyGenerator>,
    success_handler: Option<ServiceSuccessHandler>,
    error_handler: Option<ServiceErrorHandler>,
    clock: Option<Arc<dyn Clock>>,
}

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding reference: a name (`&str`/`String`) or a [`BindingRef`].
    pub fn binding(mut self, binding: impl Into<BindingRef>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    /// Resolve the binding through an async factory instead of a name.
    pub fn binding_factory<F, Fut>(mut self, factory: F) -> Self
    where
        F: Fn(&RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Binding>> + Send + 'static,
    {
        self.binding = Some(BindingRef::factory(factory));
        self
    }

    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    pub fn success_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) + Send + Sync + 'static,
    {
        self.success_handler = Some(Arc::new(handler));
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Rejection + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Clock exposed to handlers through [`RequestContext::now_secs`].
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn validate(self) -> Result<ServiceConfig, ConfigError> {
        let binding = validate_binding(self.binding)?;
        let key_generator = self.key_generator.ok_or(ConfigError::MissingKeyGenerator)?;
        Ok(ServiceConfig {
            binding,
            key_generator,
            success_handler: self
                .success_handler
                .unwrap_or_else(|| Arc::new(handlers::service_success)),
            error_handler: self.error_handler.unwrap_or_else(|| Arc::new(handlers::service_error)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

/// Validated configuration for the service-backed strategy.
#[derive(Clone)]
pub struct ServiceConfig {
    pub(crate) binding: BindingRef,
    pub(crate) key_generator: KeyGenerator,
    pub(crate) success_handler: ServiceSuccessHandler,
    pub(crate) error_handler: ServiceErrorHandler,
    pub(crate) clock: Arc<dyn Clock>,
}

impl ServiceConfig {
    pub fn binding(&self) -> &BindingRef {
        &self.binding
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("binding", &self.binding)
            .field("key_generator", &"<fn>")
            .field("success_handler", &"<handler>")
            .field("error_handler", &"<handler>")
            .field("clock", &self.clock)
            .finish()
    }
}

/// Scalar window-counter settings, as loaded from a configuration file.
///
/// Numeric fields accept numbers or numeric strings; validation happens when the options are
/// validated, not when deserializing.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct WindowSettings {
    #[cfg_attr(feature = "serde", serde(default))]
    pub prefix: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub limit: Option<RawNumber>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub period: Option<RawNumber>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub interval: Option<RawNumber>,
}

/// Raw options for the window-counter strategy.
pub struct WindowOptions {
    binding: Option<BindingRef>,
    key_generator: Option<KeyGenerator>,
    success_handler: Option<WindowSuccessHandler>,
    error_handler: Option<WindowErrorHandler>,
    prefix: String,
    limit: Option<RawNumber>,
    period: Option<RawNumber>,
    interval: RawNumber,
    counter: Arc<dyn WindowCounter>,
    clock: Arc<dyn Clock>,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            binding: None,
            key_generator: None,
            success_handler: None,
            error_handler: None,
            prefix: DEFAULT_PREFIX.to_string(),
            limit: None,
            period: None,
            interval: RawNumber::Int(0),
            counter: Arc::new(FixedWindow),
            clock: Arc::new(SystemClock),
        }
    }
}

impl WindowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding reference: a name (`&str`/`String`) or a [`BindingRef`].
    pub fn binding(mut self, binding: impl Into<BindingRef>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    /// Resolve the binding through an async factory instead of a name.
    pub fn binding_factory<F, Fut>(mut self, factory: F) -> Self
    where
        F: Fn(&RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Binding>> + Send + 'static,
    {
        self.binding = Some(BindingRef::factory(factory));
        self
    }

    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    pub fn success_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, u64, u64, u64) + Send + Sync + 'static,
    {
        self.success_handler = Some(Arc::new(handler));
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, u64, u64, u64) -> Rejection + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Storage key prefix. Defaults to [`DEFAULT_PREFIX`]; must not be empty.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Requests allowed per window (>= 1).
    pub fn limit(mut self, limit: impl Into<RawNumber>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Window length in seconds (>= 60).
    pub fn period(mut self, period: impl Into<RawNumber>) -> Self {
        self.period = Some(period.into());
        self
    }

    /// Sub-interval in seconds for reset rounding; 0 (default) disables it.
    pub fn interval(mut self, interval: impl Into<RawNumber>) -> Self {
        self.interval = interval.into();
        self
    }

    /// Apply file-loaded settings; unset fields keep their current values.
    pub fn settings(mut self, settings: WindowSettings) -> Self {
        if let Some(prefix) = settings.prefix {
            self.prefix = prefix;
        }
        if let Some(limit) = settings.limit {
            self.limit = Some(limit);
        }
        if let Some(period) = settings.period {
            self.period = Some(period);
        }
        if let Some(interval) = settings.interval {
            self.interval = interval;
        }
        self
    }

    /// Replace the counting primitive. Defaults to [`FixedWindow`].
    pub fn counter<W: WindowCounter + 'static>(mut self, counter: W) -> Self {
        self.counter = Arc::new(counter);
        self
    }

    /// Clock used by the default handlers for absolute reset timestamps.
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn validate(self) -> Result<WindowConfig, ConfigError> {
        let binding = validate_binding(self.binding)?;
        if self.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        let limit = at_least(self.limit.as_ref(), 1.0)
            .ok_or_else(|| ConfigError::InvalidLimit { provided: provided(self.limit.as_ref()) })?;
        let period = at_least(self.period.as_ref(), MIN_PERIOD_SECS as f64).ok_or_else(|| {
            ConfigError::InvalidPeriod { provided: provided(self.period.as_ref()) }
        })?;
        let interval = at_least(Some(&self.interval), 0.0).ok_or_else(|| {
            ConfigError::InvalidInterval { provided: provided(Some(&self.interval)) }
        })?;
        if interval > period {
            return Err(ConfigError::IntervalExceedsPeriod { interval, period });
        }
        let key_generator = self.key_generator.ok_or(ConfigError::MissingKeyGenerator)?;

        Ok(WindowConfig {
            binding,
            key_generator,
            success_handler: self
                .success_handler
                .unwrap_or_else(|| Arc::new(handlers::window_success)),
            error_handler: self.error_handler.unwrap_or_else(|| Arc::new(handlers::window_error)),
            prefix: self.prefix,
            policy: WindowPolicy { limit, period, interval },
            counter: self.counter,
            clock: self.clock,
        })
    }
}

/// Validated configuration for the window-counter strategy.
#[derive(Clone)]
pub struct WindowConfig {
    pub(crate) binding: BindingRef,
    pub(crate) key_generator: KeyGenerator,
    pub(crate) success_handler: WindowSuccessHandler,
    pub(crate) error_handler: WindowErrorHandler,
    pub(crate) prefix: String,
    pub(crate) policy: WindowPolicy,
    pub(crate) counter: Arc<dyn WindowCounter>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl WindowConfig {
    pub fn binding(&self) -> &BindingRef {
        &self.binding
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    /// Composite key under which `key` is counted.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl fmt::Debug for WindowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowConfig")
            .field("binding", &self.binding)
            .field("prefix", &self.prefix)
            .field("policy", &self.policy)
            .field("key_generator", &"<fn>")
            .field("success_handler", &"<handler>")
            .field("error_handler", &"<handler>")
            .field("counter", &"<counter>")
            .field("clock", &self.clock)
            .finish()
    }
}
