//! Wrapping handlers with token enforcement.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use rogalik_token::{ClaimSet, ErrorKind, TokenService};

use crate::AuthContext;

/// The error a context of type `C` is rejected with.
pub type Rejection<C> = <<C as AuthContext>::Kind as ErrorKind>::Error;

/// Wraps `handler` so it only runs for a validly authenticated context.
///
/// The returned function extracts the bearer from its input, validates
/// it with `tokens`, and on success calls `handler` with the input and
/// the decoded claims. On failure the handler never runs and the caller
/// gets the context's rejection type.
///
/// ```rust,ignore
/// let on_move = protect(tokens, |ctx: MessageContext, claims| async move {
///     apply_move(ctx.payload(), &claims["sub"])
/// });
/// match on_move(MessageContext::new(payload)).await {
///     Ok(reply) => send(reply).await,
///     Err(rejection) => close(rejection.code, rejection.reason).await,
/// }
/// ```
pub fn protect<C, H, Fut, T>(
    tokens: Arc<TokenService>,
    handler: H,
) -> impl Fn(C) -> BoxFuture<'static, Result<T, Rejection<C>>> + Clone + Send + Sync + 'static
where
    C: AuthContext,
    H: Fn(C, ClaimSet) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    move |ctx: C| {
        let tokens = Arc::clone(&tokens);
        let handler = handler.clone();
        Box::pin(async move {
            let bearer = ctx.bearer();
            let claims = match tokens.verify(&bearer).await {
                Ok(claims) => claims,
                Err(failure) => {
                    tracing::debug!(reason = failure.reason(), "protected handler not run");
                    return Err(ctx.error_kind().reject(failure));
                }
            };
            Ok(handler(ctx, claims).await)
        })
    }
}
