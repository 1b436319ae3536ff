// Canonical route flags and the per-platform decoders that fill them

use serde::{Deserialize, Serialize};

/// Linux `RTF_*` bits as reported in the flags column of `/proc/net/route`
pub mod linux {
    pub const RTF_UP: u32 = 0x0001;
    pub const RTF_GATEWAY: u32 = 0x0002;
    pub const RTF_HOST: u32 = 0x0004;
    pub const RTF_REINSTATE: u32 = 0x0008;
    pub const RTF_DYNAMIC: u32 = 0x0010;
    pub const RTF_MODIFIED: u32 = 0x0020;
    pub const RTF_REJECT: u32 = 0x0200;
    pub const RTF_STATIC: u32 = 0x0400;
    pub const RTF_ADDRCONF: u32 = 0x0004_0000;
    pub const RTF_CACHE: u32 = 0x0100_0000;
}

/// BSD `RTF_*` bits carried in `rtm_flags` (darwin-xnu `net/route.h`)
pub mod bsd {
    pub const RTF_UP: i32 = 0x1;
    pub const RTF_GATEWAY: i32 = 0x2;
    pub const RTF_HOST: i32 = 0x4;
    pub const RTF_REJECT: i32 = 0x8;
    pub const RTF_DYNAMIC: i32 = 0x10;
    pub const RTF_MODIFIED: i32 = 0x20;
    pub const RTF_CLONING: i32 = 0x100;
    pub const RTF_STATIC: i32 = 0x800;
}

/// Boolean vector over the canonical flag set.
///
/// Field order is the rendering order. A backend sets only the flags its
/// platform can determine and leaves the rest false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFlag {
    pub up: bool,
    #[serde(rename = "dest_is_single_host")]
    pub host: bool,
    pub gateway: bool,
    #[serde(rename = "static")]
    pub static_route: bool,
    #[serde(rename = "clone_based_on_route")]
    pub cloned: bool,
    #[serde(rename = "link_to_hw")]
    pub link_layer: bool,
    #[serde(rename = "reinstate_route")]
    pub reinstated: bool,
    #[serde(rename = "dynamic_installed")]
    pub dynamic: bool,
    #[serde(rename = "modified_from_routing_sw")]
    pub modified: bool,
    #[serde(rename = "installed_by_addrconf")]
    pub autoconf: bool,
    pub cached: bool,
    pub rejected: bool,
}

impl RouteFlag {
    /// Decode the flags column of `/proc/net/route`
    pub fn from_linux_mask(mask: u32) -> Self {
        use linux::*;
        RouteFlag {
            up: mask & RTF_UP != 0,
            host: mask & RTF_HOST != 0,
            gateway: mask & RTF_GATEWAY != 0,
            static_route: mask & RTF_STATIC != 0,
            cloned: false,
            link_layer: false,
            reinstated: mask & RTF_REINSTATE != 0,
            dynamic: mask & RTF_DYNAMIC != 0,
            modified: mask & RTF_MODIFIED != 0,
            autoconf: mask & RTF_ADDRCONF != 0,
            cached: mask & RTF_CACHE != 0,
            rejected: mask & RTF_REJECT != 0,
        }
    }

    /// Decode `rtm_flags` of a BSD routing message
    pub fn from_bsd_mask(mask: i32) -> Self {
        use bsd::*;
        RouteFlag {
            up: mask & RTF_UP != 0,
            host: mask & RTF_HOST != 0,
            gateway: mask & RTF_GATEWAY != 0,
            static_route: mask & RTF_STATIC != 0,
            cloned: mask & RTF_CLONING != 0,
            dynamic: mask & RTF_DYNAMIC != 0,
            modified: mask & RTF_MODIFIED != 0,
            rejected: mask & RTF_REJECT != 0,
            ..RouteFlag::default()
        }
    }

    /// Derive flags from Windows forwarding-row fields.
    ///
    /// Windows has no cloned/dynamic/modified/cached/rejected notion; those
    /// stay false.
    pub fn from_forward_row(
        interface_up: bool,
        publish: bool,
        prefix_length: u8,
        next_hop_unspecified: bool,
        immortal: bool,
        autoconfigure_address: bool,
    ) -> Self {
        RouteFlag {
            up: interface_up && publish,
            host: prefix_length == 32,
            gateway: next_hop_unspecified,
            static_route: immortal,
            autoconf: autoconfigure_address,
            ..RouteFlag::default()
        }
    }

    /// (token, value) pairs in declaration order
    pub fn tokens(&self) -> [(&'static str, bool); 12] {
        [
            ("U", self.up),
            ("H", self.host),
            ("G", self.gateway),
            ("S", self.static_route),
            ("Cloned", self.cloned),
            ("L", self.link_layer),
            ("Reinsta", self.reinstated),
            ("D", self.dynamic),
            ("M", self.modified),
            ("A", self.autoconf),
            ("Cached", self.cached),
            ("Rejected", self.rejected),
        ]
    }

    /// Comma-joined tokens of the set flags, e.g. `U,G`
    pub fn to_table_string(&self) -> String {
        self.tokens()
            .iter()
            .filter(|(_, set)| *set)
            .map(|(token, _)| *token)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linux_default_route_flags() {
        let flags = RouteFlag::from_linux_mask(linux::RTF_UP | linux::RTF_GATEWAY);
        assert_eq!(flags.to_table_string(), "U,G");
    }

    #[test]
    fn test_empty_mask_renders_empty() {
        assert_eq!(RouteFlag::from_linux_mask(0).to_table_string(), "");
        assert_eq!(RouteFlag::from_bsd_mask(0).to_table_string(), "");
    }

    #[test]
    fn test_bsd_bits_differ_from_linux() {
        // 0x8 is REINSTATE on Linux but REJECT on BSD
        assert_eq!(RouteFlag::from_linux_mask(0x8).to_table_string(), "Reinsta");
        assert_eq!(RouteFlag::from_bsd_mask(0x8).to_table_string(), "Rejected");
        assert_eq!(
            RouteFlag::from_bsd_mask(bsd::RTF_UP | bsd::RTF_STATIC | bsd::RTF_CLONING)
                .to_table_string(),
            "U,S,Cloned"
        );
    }

    #[test]
    fn test_forward_row_up_needs_publish() {
        let flags = RouteFlag::from_forward_row(true, false, 32, true, true, false);
        assert_eq!(flags.to_table_string(), "H,G,S");
        let flags = RouteFlag::from_forward_row(true, true, 24, false, false, true);
        assert_eq!(flags.to_table_string(), "U,A");
    }

    #[test]
    fn test_json_keys() {
        let json = RouteFlag::from_linux_mask(linux::RTF_UP).to_json().unwrap();
        assert!(json.starts_with("{\"up\":true,\"dest_is_single_host\":false"));
        let back: RouteFlag = serde_json::from_str(&json).unwrap();
        assert!(back.up);
    }

    proptest! {
        #[test]
        fn rendering_is_deterministic(mask in any::<u32>()) {
            let flags = RouteFlag::from_linux_mask(mask);
            prop_assert_eq!(flags.to_table_string(), flags.to_table_string());
        }

        #[test]
        fn linux_render_only_names_set_bits(mask in any::<u32>()) {
            let rendered = RouteFlag::from_linux_mask(mask).to_table_string();
            let tokens: Vec<&str> = rendered.split(',').filter(|t| !t.is_empty()).collect();
            let bit_for = |token: &str| match token {
                "U" => linux::RTF_UP,
                "H" => linux::RTF_HOST,
                "G" => linux::RTF_GATEWAY,
                "S" => linux::RTF_STATIC,
                "Reinsta" => linux::RTF_REINSTATE,
                "D" => linux::RTF_DYNAMIC,
                "M" => linux::RTF_MODIFIED,
                "A" => linux::RTF_ADDRCONF,
                "Cached" => linux::RTF_CACHE,
                "Rejected" => linux::RTF_REJECT,
                _ => 0,
            };
            for token in tokens {
                prop_assert!(mask & bit_for(token) != 0, "{} rendered without its bit", token);
            }
        }

        #[test]
        fn bsd_render_only_names_set_bits(mask in any::<i32>()) {
            let rendered = RouteFlag::from_bsd_mask(mask).to_table_string();
            for token in rendered.split(',').filter(|t| !t.is_empty()) {
                let bit = match token {
                    "U" => bsd::RTF_UP,
                    "H" => bsd::RTF_HOST,
                    "G" => bsd::RTF_GATEWAY,
                    "S" => bsd::RTF_STATIC,
                    "Cloned" => bsd::RTF_CLONING,
                    "D" => bsd::RTF_DYNAMIC,
                    "M" => bsd::RTF_MODIFIED,
                    "Rejected" => bsd::RTF_REJECT,
                    _ => 0,
                };
                prop_assert!(mask & bit != 0, "{} rendered without its bit", token);
            }
        }
    }
}
