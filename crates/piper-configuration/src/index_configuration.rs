use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

use tracing::debug;

use piper_static::EnvVars;
use piper_warnings::warn_user_once;

use crate::{NetworkConfiguration, ResolverVersion, TrustedHost};

/// The locations `pip` searches for distributions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexLocations {
    /// `None` accepts `pip`'s default index; an empty list disables index use entirely. The
    /// first entry replaces the default index, the rest are searched in addition.
    pub indexes: Option<Vec<String>>,
    /// Additional locations (URLs or local directories) to search for distributions.
    pub find_links: Vec<String>,
}

impl IndexLocations {
    /// Only search the given `--find-links` locations.
    pub fn offline(find_links: Vec<String>) -> Self {
        Self {
            indexes: Some(Vec::new()),
            find_links,
        }
    }
}

/// The arguments and environment that point an isolated `pip` invocation at its package indexes.
///
/// In `--isolated` mode, `pip` ignores its configuration files and `PIP_*` environment variables,
/// so network settings `pip` can't accept on the command line are passed through the few
/// environment variables it still honors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIndexConfiguration {
    resolver_version: ResolverVersion,
    network_configuration: NetworkConfiguration,
    args: Vec<String>,
    env: BTreeMap<String, OsString>,
    isolated: bool,
}

impl Default for PackageIndexConfiguration {
    fn default() -> Self {
        Self::create(
            IndexLocations::default(),
            NetworkConfiguration::default(),
            ResolverVersion::default(),
        )
    }
}

impl PackageIndexConfiguration {
    pub fn create(
        locations: IndexLocations,
        network_configuration: NetworkConfiguration,
        resolver_version: ResolverVersion,
    ) -> Self {
        // `--client-cert` can only be passed via `PIP_CLIENT_CERT`, which `pip` ignores in
        // `--isolated` mode.
        let isolated = network_configuration.client_cert.is_none();
        if !isolated {
            warn_user_once!(
                "A client certificate requires running `pip` without `--isolated`; `pip` configuration files and `PIP_*` environment variables will be respected"
            );
        }

        let args = Self::calculate_args(&locations, &network_configuration);
        let env = Self::calculate_env(&network_configuration, isolated);
        Self {
            resolver_version,
            network_configuration,
            args,
            env,
            isolated,
        }
    }

    fn calculate_args(
        locations: &IndexLocations,
        network_configuration: &NetworkConfiguration,
    ) -> Vec<String> {
        let mut args = Vec::new();
        let mut trusted_hosts: Vec<TrustedHost> = Vec::new();
        let mut push_location = |flag: &str, location: &str, args: &mut Vec<String>| {
            // Explicitly requested plain HTTP locations are implicitly trusted.
            if let Some(trusted_host) = TrustedHost::from_insecure_location(location) {
                if !trusted_hosts.contains(&trusted_host) {
                    trusted_hosts.push(trusted_host);
                }
            }
            args.push(flag.to_string());
            args.push(location.to_string());
        };

        if let Some(indexes) = &locations.indexes {
            if let Some((index_url, extra_index_urls)) = indexes.split_first() {
                push_location("--index-url", index_url.as_str(), &mut args);
                for extra_index_url in extra_index_urls {
                    push_location("--extra-index-url", extra_index_url.as_str(), &mut args);
                }
            } else {
                args.push("--no-index".to_string());
            }
        }

        for find_links in &locations.find_links {
            push_location("--find-links", find_links.as_str(), &mut args);
        }

        for trusted_host in &trusted_hosts {
            args.push("--trusted-host".to_string());
            args.push(trusted_host.to_string());
        }

        args.push("--retries".to_string());
        args.push(network_configuration.retries.to_string());
        args.push("--timeout".to_string());
        args.push(network_configuration.timeout.to_string());

        args
    }

    fn calculate_env(
        network_configuration: &NetworkConfiguration,
        isolated: bool,
    ) -> BTreeMap<String, OsString> {
        let mut env = BTreeMap::new();

        // `pip` honors the standard proxy variables even in `--isolated` mode.
        if let Some(proxy) = &network_configuration.proxy {
            env.insert(EnvVars::HTTP_PROXY.to_string(), OsString::from(proxy));
            env.insert(EnvVars::HTTPS_PROXY.to_string(), OsString::from(proxy));
        }

        // The vendored `requests` honors `REQUESTS_CA_BUNDLE` even in `--isolated` mode.
        if let Some(cert) = &network_configuration.cert {
            let var = if isolated {
                EnvVars::REQUESTS_CA_BUNDLE
            } else {
                EnvVars::PIP_CERT
            };
            env.insert(var.to_string(), absolute(cert));
        }

        if let Some(client_cert) = &network_configuration.client_cert {
            debug_assert!(!isolated);
            env.insert(EnvVars::PIP_CLIENT_CERT.to_string(), absolute(client_cert));
        }

        env
    }

    /// The arguments to append after the `pip` subcommand.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The environment variables to set on the `pip` process.
    pub fn env(&self) -> &BTreeMap<String, OsString> {
        &self.env
    }

    /// Whether `pip` can be run in `--isolated` mode.
    pub fn isolated(&self) -> bool {
        self.isolated
    }

    pub fn resolver_version(&self) -> ResolverVersion {
        self.resolver_version
    }

    pub fn network_configuration(&self) -> &NetworkConfiguration {
        &self.network_configuration
    }
}

fn absolute(path: &Path) -> OsString {
    match std::path::absolute(path) {
        Ok(path) => path.into_os_string(),
        Err(err) => {
            debug!("Failed to make `{}` absolute: {err}", path.display());
            path.as_os_str().to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::PathBuf;

    use super::{IndexLocations, PackageIndexConfiguration};
    use crate::{NetworkConfiguration, ResolverVersion};

    fn args(locations: IndexLocations) -> String {
        PackageIndexConfiguration::create(
            locations,
            NetworkConfiguration::default(),
            ResolverVersion::default(),
        )
        .args()
        .join(" ")
    }

    #[test]
    fn default_indexes() {
        insta::assert_snapshot!(args(IndexLocations::default()), @"--retries 5 --timeout 15");
    }

    #[test]
    fn no_indexes() {
        let args = args(IndexLocations::offline(Vec::new()));
        assert!(args.contains("--no-index"));
        assert!(!args.contains("--index-url"));
        insta::assert_snapshot!(args, @"--no-index --retries 5 --timeout 15");
    }

    #[test]
    fn insecure_hosts_are_trusted_once() {
        let args = args(IndexLocations {
            indexes: Some(vec![
                "http://a/simple".to_string(),
                "http://a/simple2".to_string(),
                "https://b/simple".to_string(),
            ]),
            find_links: vec![
                "http://c:8080/links".to_string(),
                "/srv/wheels".to_string(),
            ],
        });
        assert_eq!(args.matches("--trusted-host a ").count(), 1);
        insta::assert_snapshot!(args, @"--index-url http://a/simple --extra-index-url http://a/simple2 --extra-index-url https://b/simple --find-links http://c:8080/links --find-links /srv/wheels --trusted-host a --trusted-host c:8080 --retries 5 --timeout 15");
    }

    #[test]
    fn network_env_isolated() {
        let configuration = PackageIndexConfiguration::create(
            IndexLocations::default(),
            NetworkConfiguration {
                proxy: Some("http://proxy:3128".to_string()),
                cert: Some(PathBuf::from("/etc/ssl/bundle.pem")),
                retries: 1,
                timeout: 3,
                ..NetworkConfiguration::default()
            },
            ResolverVersion::default(),
        );
        assert!(configuration.isolated());
        assert_eq!(
            configuration.env().get("http_proxy"),
            Some(&OsString::from("http://proxy:3128"))
        );
        assert_eq!(
            configuration.env().get("https_proxy"),
            Some(&OsString::from("http://proxy:3128"))
        );
        assert_eq!(
            configuration.env().get("REQUESTS_CA_BUNDLE"),
            Some(&OsString::from("/etc/ssl/bundle.pem"))
        );
        assert!(!configuration.env().contains_key("PIP_CERT"));
        assert_eq!(
            configuration.args().join(" "),
            "--retries 1 --timeout 3"
        );
    }

    #[test]
    fn client_cert_breaks_isolation() {
        let configuration = PackageIndexConfiguration::create(
            IndexLocations::default(),
            NetworkConfiguration {
                cert: Some(PathBuf::from("/etc/ssl/bundle.pem")),
                client_cert: Some(PathBuf::from("/etc/ssl/client.pem")),
                ..NetworkConfiguration::default()
            },
            ResolverVersion::PipLegacy,
        );
        assert!(!configuration.isolated());
        assert_eq!(configuration.resolver_version(), ResolverVersion::PipLegacy);
        assert_eq!(
            configuration.env().get("PIP_CERT"),
            Some(&OsString::from("/etc/ssl/bundle.pem"))
        );
        assert_eq!(
            configuration.env().get("PIP_CLIENT_CERT"),
            Some(&OsString::from("/etc/ssl/client.pem"))
        );
        assert!(!configuration.env().contains_key("REQUESTS_CA_BUNDLE"));
    }
}
