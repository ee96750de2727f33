//! Request classification.

use url::{Origin, Url};

use harbor_common::Request;

/// Where an intercepted request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not a GET: handed back to the host untouched, no cache involvement.
    PassThrough,
    /// GET to the worker's own origin: network-first.
    SameOrigin,
    /// GET to any other origin: cache-first.
    CrossOrigin,
}

/// Classifies requests against the worker's origin.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Origin,
}

impl Router {
    /// Router for a worker registered at `scope`.
    pub fn new(scope: &Url) -> Self {
        Self {
            origin: scope.origin(),
        }
    }

    /// The worker's origin.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Decide the route for a request. Pure, no I/O.
    ///
    /// Origins are compared as (scheme, host, port) tuples. URLs with an
    /// opaque origin never match and go cross-origin.
    pub fn classify(&self, request: &Request) -> Route {
        if !request.method.is_get() {
            return Route::PassThrough;
        }

        if request.url.origin() == self.origin {
            Route::SameOrigin
        } else {
            Route::CrossOrigin
        }
    }
}
