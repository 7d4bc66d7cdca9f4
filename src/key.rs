//! Rate-limit key derivation.

use crate::context::RequestContext;
use std::sync::Arc;

/// User-supplied function mapping a request to its rate-limit key.
///
/// `None` or an empty string means "do not rate limit this request".
pub type KeyGenerator = Arc<dyn Fn(&RequestContext) -> Option<String> + Send + Sync>;

/// Run the generator once and normalize empty keys to `None`.
pub fn derive_key(generator: &KeyGenerator, ctx: &RequestContext) -> Option<String> {
    generator(ctx).filter(|key| !key.is_empty())
}

/// Key generator that uses the value of a request header, e.g. `x-forwarded-for` or an API
/// key header. Requests without the header bypass rate limiting.
pub fn from_header(name: &'static str) -> impl Fn(&RequestContext) -> Option<String> + Send + Sync {
    move |ctx| ctx.header(name).map(|value| value.trim().to_string())
}
