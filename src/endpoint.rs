// Endpoint resolution for the fixed Protecode SC REST surface.
//
// Each operation is an enum variant carrying exactly the parameters its path
// template needs, so an unknown operation or a missing parameter is a
// compile error rather than a runtime one.

/// One addressable API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    Upload { filename: &'a str },
    Result { id_or_sha1: &'a str },
    Rescan { id_or_sha1: &'a str },
    Groups,
    Apps,
    AppsByGroup { group: &'a str },
}

impl<'a> Endpoint<'a> {
    /// Symbolic operation name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Upload { .. } => "upload",
            Endpoint::Result { .. } => "result",
            Endpoint::Rescan { .. } => "rescan",
            Endpoint::Groups => "groups",
            Endpoint::Apps => "apps",
            Endpoint::AppsByGroup { .. } => "apps-by-group",
        }
    }

    /// Full request URI under `host`.
    pub fn resolve(&self, host: &str) -> String {
        let host = host.trim_end_matches('/');
        match self {
            Endpoint::Upload { filename } => format!("{}/api/upload/{}", host, filename),
            Endpoint::Result { id_or_sha1 } => format!("{}/api/app/{}/", host, id_or_sha1),
            Endpoint::Rescan { id_or_sha1 } => format!("{}/api/rescan/{}/", host, id_or_sha1),
            Endpoint::Groups => format!("{}/api/groups/", host),
            Endpoint::Apps => format!("{}/api/apps/", host),
            Endpoint::AppsByGroup { group } => format!("{}/api/apps/{}", host, group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "https://appliance.example.com";

    #[test]
    fn resolves_every_template() {
        let cases = [
            (
                Endpoint::Upload { filename: "app.zip" },
                "https://appliance.example.com/api/upload/app.zip",
            ),
            (
                Endpoint::Result { id_or_sha1: "42" },
                "https://appliance.example.com/api/app/42/",
            ),
            (
                Endpoint::Rescan { id_or_sha1: "abc" },
                "https://appliance.example.com/api/rescan/abc/",
            ),
            (Endpoint::Groups, "https://appliance.example.com/api/groups/"),
            (Endpoint::Apps, "https://appliance.example.com/api/apps/"),
            (
                Endpoint::AppsByGroup { group: "7" },
                "https://appliance.example.com/api/apps/7",
            ),
        ];
        for (endpoint, expected) in cases {
            assert_eq!(endpoint.resolve(HOST), expected, "{}", endpoint.name());
        }
    }

    #[test]
    fn trailing_slash_on_host_is_ignored() {
        assert_eq!(
            Endpoint::Groups.resolve("https://protecode-sc.com/"),
            "https://protecode-sc.com/api/groups/"
        );
    }

    #[test]
    fn names_match_operations() {
        assert_eq!(Endpoint::AppsByGroup { group: "1" }.name(), "apps-by-group");
        assert_eq!(Endpoint::Upload { filename: "f" }.name(), "upload");
    }
}
