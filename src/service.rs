use crate::config::Config;
use crate::header_tools::forwarded_ip;
use crate::store::IntervalStore;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

const LOOKUP_PREFIX: &str = "/lookup/";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid IP address")]
    InvalidIp(String),
    #[error("IP not found in any range")]
    NotFound(IpAddr),
    #[error("Method {0} is not allowed")]
    MethodNotAllowed(Method),
    #[error("Path {0:?} is not found")]
    UnknownPath(String),
    #[error(r#"Internal server error: "{0:?}""#)]
    InternalServerError(#[from] hyper::http::Error),
    #[error(r#"Internal server error: "{0:?}""#)]
    Serialization(#[from] serde_json::Error),
}

/// Body of a successful lookup
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IpInfo {
    pub ip: String,
    pub country_name: String,
    pub continent_name: String,
}

pub struct LookupService {
    store: Arc<IntervalStore>,
    ip_headers: Vec<String>,
    ip_headers_recursive: bool,
}

impl LookupService {
    pub fn new(
        store: Arc<IntervalStore>,
        ip_headers: Vec<String>,
        ip_headers_recursive: bool,
    ) -> Self {
        Self {
            store,
            ip_headers,
            ip_headers_recursive,
        }
    }

    pub fn from_config(config: &Config, store: Arc<IntervalStore>) -> Self {
        Self::new(
            store,
            config.ip_headers.clone(),
            config.ip_headers_recursive,
        )
    }

    /// Location of a textual address, echoing the address as given
    pub fn lookup(&self, ip: &str) -> Result<IpInfo, ServiceError> {
        let address: IpAddr = ip
            .parse()
            .map_err(|_| ServiceError::InvalidIp(ip.to_owned()))?;
        let interval = self
            .store
            .find_containing(address)
            .ok_or(ServiceError::NotFound(address))?;
        Ok(IpInfo {
            ip: ip.to_owned(),
            country_name: interval.country_name().to_owned(),
            continent_name: interval.continent_name().to_owned(),
        })
    }

    fn client_ip(&self, request: &Request<Body>, socket_ip_addr: IpAddr) -> IpAddr {
        forwarded_ip(
            request.headers(),
            &self.ip_headers,
            self.ip_headers_recursive,
        )
        .unwrap_or(socket_ip_addr)
        .to_canonical()
    }

    pub fn response(
        &self,
        socket_ip_addr: IpAddr,
        request: &Request<Body>,
    ) -> Result<Response<Body>, ServiceError> {
        if request.method() != Method::GET {
            return Err(ServiceError::MethodNotAllowed(request.method().clone()));
        }
        let path = request.uri().path();
        let info = if path == "/" {
            self.lookup(&self.client_ip(request, socket_ip_addr).to_string())?
        } else {
            match path.strip_prefix(LOOKUP_PREFIX) {
                Some(segment) if !segment.contains('/') => {
                    let ip = percent_decode_str(segment)
                        .decode_utf8()
                        .map_err(|_| ServiceError::InvalidIp(segment.to_owned()))?;
                    self.lookup(&ip)?
                }
                _ => return Err(ServiceError::UnknownPath(path.to_owned())),
            }
        };
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(serde_json::to_string(&info)?.into())?;
        Ok(response)
    }
}

pub fn make_error_response(error: ServiceError) -> Response<Body> {
    let status = match error {
        ServiceError::InvalidIp(_) | ServiceError::NotFound(_) | ServiceError::UnknownPath(_) => {
            StatusCode::NOT_FOUND
        }
        ServiceError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        ServiceError::InternalServerError(_) | ServiceError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("{error}");
    }
    let mut response = Response::new(Body::from(format!("{error}\n")));
    *response.status_mut() = status;
    response
}

pub fn log_response(socket_ip_addr: IpAddr, request: &Request<Body>, response: &Response<Body>) {
    log::info!(
        "{} {} {} {}",
        socket_ip_addr,
        request.method(),
        request.uri(),
        response.status(),
    );
}
