//! Location strings for the `ocimotel` transport.
//!
//! A location has the shape `//[host[:port]]/name[/...]:tag` or
//! `//[host[:port]]/name[/...]/tag`. The endpoint is always the first segment
//! after `//`; the repository and tag are always the part after it. That
//! split is purely structural, so `host:port` and `name:tag` never compete
//! for the same colon.
//!
//! | Input                         | host        | port   | name      | tag    |
//! |-------------------------------|-------------|--------|-----------|--------|
//! | `///library/app:v1`           | -           | -      | library/app | v1   |
//! | `//app/v1`                    | -           | -      | app       | v1     |
//! | `//reg.local/app/v1`          | reg.local   | -      | app       | v1     |
//! | `//reg.local:5000/team/app:v1`| reg.local   | 5000   | team/app  | v1     |

use std::fmt;
use std::str::FromStr;

use crate::error::{RegistryError, Result};

/// Host used when a location does not name one.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when a location does not name one.
pub const DEFAULT_PORT: u16 = 8080;

/// A reachable registry repository and tag.
///
/// Built once from a location string and shared by the source and
/// destination of a copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    host: Option<String>,
    port: Option<u16>,
    name: String,
    tag: String,
}

impl Locator {
    /// Parses a location string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidLocator`] if the string does not start
    /// with `//`, has a malformed endpoint or port, or carries no tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use motel_registry::Locator;
    ///
    /// let locator = Locator::parse("//registry.local:5000/team/app:v1")?;
    /// assert_eq!(locator.host(), Some("registry.local"));
    /// assert_eq!(locator.port(), Some(5000));
    /// assert_eq!(locator.name(), "team/app");
    /// assert_eq!(locator.tag(), "v1");
    /// # Ok::<(), motel_registry::RegistryError>(())
    /// ```
    pub fn parse(reference: &str) -> Result<Self> {
        let rest = reference
            .strip_prefix("//")
            .ok_or_else(|| RegistryError::invalid_locator(reference, "does not start with //"))?;

        let (endpoint, path) = if let Some(path) = rest.strip_prefix('/') {
            (None, path)
        } else {
            match rest.split_once('/') {
                None => return Err(RegistryError::invalid_locator(reference, "no tag specified")),
                Some((first, remainder)) if remainder.contains([':', '/']) => {
                    (Some(first), remainder)
                }
                // Two bare segments leave no room for an endpoint.
                Some((first, _)) if first.contains(':') => {
                    return Err(RegistryError::invalid_locator(reference, "no tag specified"));
                }
                Some(_) => (None, rest),
            }
        };

        let (host, port) = match endpoint {
            Some(endpoint) => parse_endpoint(reference, endpoint)?,
            None => (None, None),
        };

        let (name, tag) = split_name_tag(path)
            .ok_or_else(|| RegistryError::invalid_locator(reference, "no tag specified"))?;

        if name.split('/').any(str::is_empty) {
            return Err(RegistryError::invalid_locator(
                reference,
                format!("invalid repository name '{name}'"),
            ));
        }

        Ok(Self {
            host,
            port,
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Returns the endpoint host, if the location named one.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the endpoint port, if the location named one.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the repository name (may contain `/`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the base URL every registry exchange is rooted at.
    ///
    /// ```
    /// use motel_registry::Locator;
    ///
    /// let locator = Locator::parse("///app:v1")?;
    /// assert_eq!(locator.url_base(), "http://127.0.0.1:8080");
    /// # Ok::<(), motel_registry::RegistryError>(())
    /// ```
    #[must_use]
    pub fn url_base(&self) -> String {
        format!(
            "http://{}:{}",
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port.unwrap_or(DEFAULT_PORT)
        )
    }

    /// Identity used when matching this location against a policy.
    #[must_use]
    pub fn policy_identity(&self) -> String {
        self.to_string()
    }

    /// Namespaces to consult for policy lookup. This transport has none.
    #[must_use]
    pub const fn policy_namespaces(&self) -> Vec<String> {
        Vec::new()
    }

    /// Docker-style reference for the location. Locations of this transport
    /// have no such form.
    #[must_use]
    pub const fn docker_reference(&self) -> Option<&str> {
        None
    }
}

fn parse_endpoint(reference: &str, endpoint: &str) -> Result<(Option<String>, Option<u16>)> {
    let mut parts = endpoint.split(':');
    let host = parts.next().unwrap_or_default();
    let port = parts.next();
    if parts.next().is_some() {
        return Err(RegistryError::invalid_locator(
            reference,
            format!("bad endpoint '{endpoint}'"),
        ));
    }

    let port = match port {
        Some(port) => match port.parse::<u16>() {
            Ok(port) if port >= 1 => Some(port),
            _ => {
                return Err(RegistryError::invalid_locator(
                    reference,
                    format!("bad port '{port}'"),
                ))
            }
        },
        None => None,
    };

    let host = (!host.is_empty()).then(|| host.to_string());
    Ok((host, port))
}

fn split_name_tag(path: &str) -> Option<(&str, &str)> {
    let (name, tag) = if path.contains(':') {
        let (name, tag) = path.split_once(':')?;
        if tag.contains([':', '/']) {
            return None;
        }
        (name, tag)
    } else {
        path.rsplit_once('/')?
    };

    (!name.is_empty() && !tag.is_empty()).then_some((name, tag))
}

impl FromStr for Locator {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("//")?;
        if let Some(host) = &self.host {
            f.write_str(host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "/{}:{}", self.name, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn parse(s: &str) -> Locator {
        Locator::parse(s).unwrap()
    }

    #[test]
    fn test_no_endpoint() {
        let loc = parse("///library/app:v1");
        assert_eq!(loc.host(), None);
        assert_eq!(loc.port(), None);
        assert_eq!(loc.name(), "library/app");
        assert_eq!(loc.tag(), "v1");
        assert_eq!(loc.url_base(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_no_endpoint_slash_tag() {
        let loc = parse("///a/b/c");
        assert_eq!(loc.host(), None);
        assert_eq!(loc.name(), "a/b");
        assert_eq!(loc.tag(), "c");
    }

    #[test]
    fn test_name_slash_tag() {
        let loc = parse("//app/v1");
        assert_eq!(loc.host(), None);
        assert_eq!(loc.name(), "app");
        assert_eq!(loc.tag(), "v1");
    }

    #[test]
    fn test_host_name_slash_tag() {
        let loc = parse("//reg.local/app/v1");
        assert_eq!(loc.host(), Some("reg.local"));
        assert_eq!(loc.port(), None);
        assert_eq!(loc.name(), "app");
        assert_eq!(loc.tag(), "v1");
        assert_eq!(loc.url_base(), "http://reg.local:8080");
    }

    #[test]
    fn test_host_port_name_slash_tag() {
        let loc = parse("//reg.local:5000/team/app/v1");
        assert_eq!(loc.host(), Some("reg.local"));
        assert_eq!(loc.port(), Some(5000));
        assert_eq!(loc.name(), "team/app");
        assert_eq!(loc.tag(), "v1");
    }

    #[test]
    fn test_host_port_name_colon_tag() {
        let loc = parse("//reg.local:5000/team/app:v1.2");
        assert_eq!(loc.host(), Some("reg.local"));
        assert_eq!(loc.port(), Some(5000));
        assert_eq!(loc.name(), "team/app");
        assert_eq!(loc.tag(), "v1.2");
        assert_eq!(loc.url_base(), "http://reg.local:5000");
    }

    #[test]
    fn test_port_without_host() {
        let loc = parse("//:5000/app:v1");
        assert_eq!(loc.host(), None);
        assert_eq!(loc.port(), Some(5000));
        assert_eq!(loc.url_base(), "http://127.0.0.1:5000");
    }

    #[test]
    fn test_missing_prefix() {
        let err = Locator::parse("reg.local/app:v1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("does not start with //"));

        assert!(Locator::parse("/reg.local/app:v1").is_err());
    }

    #[test]
    fn test_missing_tag() {
        for bad in ["//app", "///app", "//reg.local:5000/app", "///app:", "///:v1", "//"] {
            let err = Locator::parse(bad).unwrap_err();
            assert!(
                err.to_string().contains("no tag specified"),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn test_two_colons_in_path() {
        assert!(Locator::parse("//reg/app:v1:extra").is_err());
    }

    #[test]
    fn test_tag_may_not_contain_slash() {
        assert!(Locator::parse("//reg/app:v1/more").is_err());
    }

    #[test]
    fn test_bad_ports() {
        for bad in [
            "//reg:0/app:v1",
            "//reg:65536/app:v1",
            "//reg:http/app:v1",
            "//reg:/app:v1",
            "//reg:-1/app:v1",
        ] {
            let err = Locator::parse(bad).unwrap_err();
            assert!(err.to_string().contains("bad port"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_extra_colon_in_endpoint() {
        let err = Locator::parse("//reg:5000:1/app:v1").unwrap_err();
        assert!(err.to_string().contains("bad endpoint"));
    }

    #[test]
    fn test_empty_name_segment() {
        assert!(Locator::parse("//reg/a//b:v1").is_err());
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(parse("//app/v1").to_string(), "///app:v1");
        assert_eq!(parse("//reg/app/v1").to_string(), "//reg/app:v1");
        assert_eq!(parse("//reg:5000/a/b:v1").to_string(), "//reg:5000/a/b:v1");
        assert_eq!(parse("//:5000/app:v1").to_string(), "//:5000/app:v1");
    }

    #[test]
    fn test_policy_identity() {
        let loc = parse("//reg:5000/app:v1");
        assert_eq!(loc.policy_identity(), "//reg:5000/app:v1");
        assert!(loc.policy_namespaces().is_empty());
        assert!(loc.docker_reference().is_none());
    }

    #[test]
    fn test_from_str() {
        let loc: Locator = "//reg/app:v1".parse().unwrap();
        assert_eq!(loc.name(), "app");
    }

    fn host_strategy() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,12}(\\.[a-z]{2,6})?"
    }

    fn name_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z0-9][a-z0-9_.-]{0,10}", 1..4).prop_map(|s| s.join("/"))
    }

    fn segment_strategy() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9_.-]{0,10}"
    }

    fn tag_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_][A-Za-z0-9_.-]{0,20}"
    }

    proptest! {
        #[test]
        fn prop_name_slash_tag(name in segment_strategy(), tag in tag_strategy()) {
            let loc = Locator::parse(&format!("//{name}/{tag}")).unwrap();
            prop_assert_eq!(loc.host(), None);
            prop_assert_eq!(loc.port(), None);
            prop_assert_eq!(loc.name(), name.as_str());
            prop_assert_eq!(loc.tag(), tag.as_str());
        }

        #[test]
        fn prop_host_name_slash_tag(
            host in host_strategy(),
            name in name_strategy(),
            tag in tag_strategy()
        ) {
            let loc = Locator::parse(&format!("//{host}/{name}/{tag}")).unwrap();
            prop_assert_eq!(loc.host(), Some(host.as_str()));
            prop_assert_eq!(loc.port(), None);
            prop_assert_eq!(loc.name(), name.as_str());
            prop_assert_eq!(loc.tag(), tag.as_str());
        }

        #[test]
        fn prop_host_port_name_slash_tag(
            host in host_strategy(),
            port in 1u16..=u16::MAX,
            name in name_strategy(),
            tag in tag_strategy()
        ) {
            let loc = Locator::parse(&format!("//{host}:{port}/{name}/{tag}")).unwrap();
            prop_assert_eq!(loc.host(), Some(host.as_str()));
            prop_assert_eq!(loc.port(), Some(port));
            prop_assert_eq!(loc.name(), name.as_str());
            prop_assert_eq!(loc.tag(), tag.as_str());
        }

        #[test]
        fn prop_host_port_name_colon_tag(
            host in host_strategy(),
            port in 1u16..=u16::MAX,
            name in name_strategy(),
            tag in tag_strategy()
        ) {
            let loc = Locator::parse(&format!("//{host}:{port}/{name}:{tag}")).unwrap();
            prop_assert_eq!(loc.host(), Some(host.as_str()));
            prop_assert_eq!(loc.port(), Some(port));
            prop_assert_eq!(loc.name(), name.as_str());
            prop_assert_eq!(loc.tag(), tag.as_str());
        }

        #[test]
        fn prop_display_round_trips(
            host in prop::option::of(host_strategy()),
            port in prop::option::of(1u16..=u16::MAX),
            name in name_strategy(),
            tag in tag_strategy()
        ) {
            let endpoint = match (&host, port) {
                (Some(h), Some(p)) => format!("{h}:{p}"),
                (Some(h), None) => h.clone(),
                (None, Some(p)) => format!(":{p}"),
                (None, None) => String::new(),
            };
            let loc = Locator::parse(&format!("//{endpoint}/{name}:{tag}")).unwrap();
            let again = Locator::parse(&loc.to_string()).unwrap();
            prop_assert_eq!(loc, again);
        }

        #[test]
        fn prop_missing_prefix_fails(host in host_strategy(), name in name_strategy(), tag in tag_strategy()) {
            let reference = format!("{host}/{name}:{tag}");
            prop_assert!(Locator::parse(&reference).is_err());
        }

        #[test]
        fn prop_out_of_range_port_fails(host in host_strategy(), port in 65536u32..1_000_000, tag in tag_strategy()) {
            let reference = format!("//{host}:{port}/app:{tag}");
            prop_assert!(Locator::parse(&reference).is_err());
        }
    }
}
