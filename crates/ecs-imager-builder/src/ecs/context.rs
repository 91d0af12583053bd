//! Credentials and endpoint selection for the provider API

use std::fmt;

/// Access key pair
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    access_key_secret: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    pub(crate) fn secret(&self) -> &str {
        &self.access_key_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .finish()
    }
}

/// Which RPC product a call goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Ecs,
    Vpc,
}

impl Service {
    /// API version sent with every call
    pub fn api_version(self) -> &'static str {
        match self {
            Service::Ecs => "2014-05-26",
            Service::Vpc => "2016-04-28",
        }
    }

    fn host_prefix(self) -> &'static str {
        match self {
            Service::Ecs => "ecs",
            Service::Vpc => "vpc",
        }
    }
}

/// Shared provider context: credentials, build region and endpoint overrides
#[derive(Clone)]
pub struct EcsContext {
    pub credentials: Credentials,
    pub region: String,
    ecs_endpoint: Option<String>,
    vpc_endpoint: Option<String>,
}

impl EcsContext {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
            ecs_endpoint: None,
            vpc_endpoint: None,
        }
    }

    /// Override endpoints; a bare host gets `https://`
    pub fn with_endpoints(mut self, ecs: Option<String>, vpc: Option<String>) -> Self {
        self.ecs_endpoint = ecs;
        self.vpc_endpoint = vpc;
        self
    }

    /// Base URL for a service in a region
    pub fn endpoint(&self, service: Service, region: &str) -> String {
        let configured = match service {
            Service::Ecs => self.ecs_endpoint.as_deref(),
            Service::Vpc => self.vpc_endpoint.as_deref(),
        };
        match configured {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                url.trim_end_matches('/').to_string()
            }
            Some(host) => format!("https://{}", host.trim_end_matches('/')),
            None => format!("https://{}.{region}.aliyuncs.com", service.host_prefix()),
        }
    }
}

impl fmt::Debug for EcsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcsContext")
            .field("region", &self.region)
            .field("access_key_id", &self.credentials.access_key_id)
            .field("ecs_endpoint", &self.endpoint(Service::Ecs, &self.region))
            .field("vpc_endpoint", &self.endpoint(Service::Vpc, &self.region))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let ctx = EcsContext::new(Credentials::new("id", "secret"), "cn-beijing");
        assert_eq!(
            ctx.endpoint(Service::Ecs, "cn-beijing"),
            "https://ecs.cn-beijing.aliyuncs.com"
        );
        assert_eq!(
            ctx.endpoint(Service::Vpc, "eu-central-1"),
            "https://vpc.eu-central-1.aliyuncs.com"
        );
    }

    #[test]
    fn test_endpoint_overrides() {
        let ctx = EcsContext::new(Credentials::new("id", "secret"), "cn-beijing").with_endpoints(
            Some("http://127.0.0.1:8080/".to_string()),
            Some("vpc-vpc.cn-beijing.aliyuncs.com".to_string()),
        );
        assert_eq!(ctx.endpoint(Service::Ecs, "cn-beijing"), "http://127.0.0.1:8080");
        assert_eq!(
            ctx.endpoint(Service::Vpc, "cn-beijing"),
            "https://vpc-vpc.cn-beijing.aliyuncs.com"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let ctx = EcsContext::new(Credentials::new("LTAIexample", "hunter2"), "cn-beijing");
        let debug = format!("{ctx:?} {:?}", ctx.credentials);
        assert!(debug.contains("LTAIexample"));
        assert!(!debug.contains("hunter2"));
    }
}
