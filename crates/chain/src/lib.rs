//! Interception chain engine.
//!
//! An ordered list of interceptors plus a terminal action is folded into a
//! single asynchronous resolver. Every invocation runs against a fresh tree
//! of [`InterceptionContext`] nodes; canceling a node abandons whatever is
//! currently downstream of it, and a canceled branch never settles.
//!
//! Compiled resolvers are memoized per key by [`ChainRegistry`].

pub mod builder;
pub mod context;
pub mod registry;

pub use {
    builder::{Action, ChainBuilder, ChainFuture, Interceptor, Next, Resolver, action, interceptor},
    context::{ContextId, InterceptionContext},
    registry::{ChainFactory, ChainRegistry},
};
