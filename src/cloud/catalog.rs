//! Service catalog
//!
//! Maps service types used by definitions to the host name prefix of their
//! endpoints. Endpoints look like `https://{name}.{region}.{cloud}/`; global
//! services drop the region.

/// Endpoint scope of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Regional,
    Global,
}

/// Catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCatalog {
    /// Host name prefix
    pub name: &'static str,
    pub scope: Scope,
}

const CATALOG: &[(&str, ServiceCatalog)] = &[
    ("cbr", ServiceCatalog { name: "cbr", scope: Scope::Regional }),
    ("dms", ServiceCatalog { name: "dms", scope: Scope::Regional }),
    ("eg", ServiceCatalog { name: "eg", scope: Scope::Regional }),
    ("elb", ServiceCatalog { name: "elb", scope: Scope::Regional }),
    ("iam", ServiceCatalog { name: "iam", scope: Scope::Global }),
    ("iotda", ServiceCatalog { name: "iotda", scope: Scope::Regional }),
    ("live", ServiceCatalog { name: "live", scope: Scope::Regional }),
    ("secmaster", ServiceCatalog { name: "secmaster", scope: Scope::Regional }),
    ("workspace", ServiceCatalog { name: "workspace", scope: Scope::Regional }),
];

/// Look up a service type
pub fn lookup(service: &str) -> Option<&'static ServiceCatalog> {
    CATALOG
        .iter()
        .find(|(key, _)| *key == service)
        .map(|(_, catalog)| catalog)
}

/// Default endpoint for a catalog entry
pub fn default_endpoint(catalog: &ServiceCatalog, region: &str, cloud: &str) -> String {
    match catalog.scope {
        Scope::Regional => format!("https://{}.{}.{}/", catalog.name, region, cloud),
        Scope::Global => format!("https://{}.{}/", catalog.name, cloud),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regional_endpoint() {
        let elb = lookup("elb").unwrap();
        assert_eq!(
            default_endpoint(elb, "cn-north-4", "myhuaweicloud.com"),
            "https://elb.cn-north-4.myhuaweicloud.com/"
        );
    }

    #[test]
    fn test_global_endpoint_has_no_region() {
        let iam = lookup("iam").unwrap();
        assert_eq!(
            default_endpoint(iam, "cn-north-4", "myhuaweicloud.com"),
            "https://iam.myhuaweicloud.com/"
        );
    }

    #[test]
    fn test_unknown_service() {
        assert!(lookup("not-a-service").is_none());
    }
}
