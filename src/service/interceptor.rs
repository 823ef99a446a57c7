// src/service/interceptor.rs

//! Hooks around every request.
//!
//! Request interceptors run in registration order before fingerprinting, so
//! a rewrite changes what gets deduplicated and cached. Response
//! interceptors run in registration order on the terminal outcome.

use crate::engine::Outcome;
use crate::request::RequestSpec;
use crate::transport::Response;

/// What a request interceptor decided.
#[derive(Debug)]
pub enum Intercept {
    /// Carry on with this (possibly rewritten) request.
    Continue(RequestSpec),
    /// Skip the scheduler and transport; this is the outcome.
    Respond(Outcome<Response>),
}

pub trait RequestInterceptor: Send + Sync + 'static {
    fn intercept(&self, request: RequestSpec) -> Intercept;
}

pub trait ResponseInterceptor: Send + Sync + 'static {
    fn intercept(&self, request: &RequestSpec, outcome: Outcome<Response>) -> Outcome<Response>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(RequestSpec) -> Intercept + Send + Sync + 'static,
{
    fn intercept(&self, request: RequestSpec) -> Intercept {
        self(request)
    }
}

impl<F> ResponseInterceptor for F
where
    F: Fn(&RequestSpec, Outcome<Response>) -> Outcome<Response> + Send + Sync + 'static,
{
    fn intercept(&self, request: &RequestSpec, outcome: Outcome<Response>) -> Outcome<Response> {
        self(request, outcome)
    }
}
