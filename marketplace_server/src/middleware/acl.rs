//! Role-based access control for routes.
//!
//! The middleware reads the caller's [`Identity`] from the request headers and lets the request through if the
//! caller holds any of the roles the route accepts. A missing identity is answered with `401 Unauthorized`, a role
//! that is not accepted with `403 Forbidden`.
//!
//! Finer checks, such as whether a seller owns the order they are acting on, are made by the engine.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::*;
use marketplace_engine::db_types::Role;

use crate::{errors::ServerError, identity::Identity};

pub struct AclMiddlewareFactory {
    accepted_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(accepted_roles: &[Role]) -> Self {
        AclMiddlewareFactory { accepted_roles: accepted_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AclMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { accepted_roles: self.accepted_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    accepted_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let accepted_roles = self.accepted_roles.clone();
        Box::pin(async move {
            let identity = Identity::from_headers(req.headers())?;
            if accepted_roles.contains(&identity.role) {
                service.call(req).await
            } else {
                debug!("💻️ {} ({}) may not call {}", identity.user_id, identity.role, req.path());
                Err(ServerError::InsufficientPermissions(format!(
                    "The {} role cannot perform this action",
                    identity.role
                ))
                .into())
            }
        })
    }
}
