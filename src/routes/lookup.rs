// Route lookup over a normalized routing table, longest netmask wins

use super::NetRoute;
use crate::codec::netmask_to_prefix_len;
use std::net::Ipv4Addr;

pub struct RouteLookup<'a> {
    routes: &'a [NetRoute],
}

impl<'a> RouteLookup<'a> {
    pub fn new(routes: &'a [NetRoute]) -> Self {
        RouteLookup { routes }
    }

    /// Find the route a packet to `dest` would take.
    ///
    /// Only routes that are up and not rejecting are candidates. Longest
    /// netmask wins, then the lower metric, then table order.
    pub fn lookup(&self, dest: Ipv4Addr) -> Option<&'a NetRoute> {
        let mut best_match: Option<(&'a NetRoute, u8)> = None;

        for route in self.routes.iter().filter(|route| forwards(route)) {
            let Some((network, netmask)) = parse_destination(&route.destination) else {
                continue;
            };
            if !ip_v4_matches(network, dest, netmask) {
                continue;
            }

            // Non-contiguous masks still rank by how many bits they fix
            let prefix_len = netmask_to_prefix_len(netmask)
                .unwrap_or_else(|| u32::from(netmask).count_ones() as u8);

            match best_match {
                None => best_match = Some((route, prefix_len)),
                Some((current, current_len))
                    if prefix_len > current_len
                        || (prefix_len == current_len && route.metric < current.metric) =>
                {
                    best_match = Some((route, prefix_len));
                }
                _ => {}
            }
        }

        best_match.map(|(route, _)| route)
    }
}

fn forwards(route: &NetRoute) -> bool {
    let mut up = false;
    for token in route.flags.split(',') {
        match token {
            "U" => up = true,
            "Rejected" => return false,
            _ => {}
        }
    }
    up
}

/// Split `<network>/<netmask>`; a netmask of `0` means `0.0.0.0`
fn parse_destination(destination: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let (network, netmask) = destination.split_once('/')?;
    let network = network.parse().ok()?;
    let netmask = match netmask {
        "0" => Ipv4Addr::UNSPECIFIED,
        mask => mask.parse().ok()?,
    };
    Some((network, netmask))
}

fn ip_v4_matches(network: Ipv4Addr, addr: Ipv4Addr, netmask: Ipv4Addr) -> bool {
    let mask = u32::from(netmask);
    (u32::from(network) & mask) == (u32::from(addr) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(destination: &str, gateway: &str, metric: u32) -> NetRoute {
        NetRoute {
            metric,
            destination: destination.to_string(),
            gateway: gateway.to_string(),
            flags: "U".to_string(),
            iface: "eth0".to_string(),
        }
    }

    #[test]
    fn test_ipv4_matches() {
        let network: Ipv4Addr = "192.168.1.0".parse().unwrap();
        let mask: Ipv4Addr = "255.255.255.0".parse().unwrap();

        assert!(ip_v4_matches(network, "192.168.1.100".parse().unwrap(), mask));
        assert!(!ip_v4_matches(network, "192.168.2.100".parse().unwrap(), mask));
    }

    #[test]
    fn test_parse_destination() {
        assert_eq!(
            parse_destination("10.0.0.0/255.0.0.0"),
            Some((Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 0, 0)))
        );
        assert_eq!(
            parse_destination("0.0.0.0/0"),
            Some((Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED))
        );
        assert_eq!(parse_destination("unk/0"), None);
        assert_eq!(parse_destination("/0"), None);
        assert_eq!(parse_destination("10.0.0.0"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let routes = vec![
            route("0.0.0.0/0.0.0.0", "10.0.0.1", 100),
            route("192.168.0.0/255.255.0.0", "10.0.0.2", 100),
            route("192.168.1.0/255.255.255.0", "0.0.0.0", 600),
        ];
        let lookup = RouteLookup::new(&routes);

        let best = lookup.lookup(Ipv4Addr::new(192, 168, 1, 100)).unwrap();
        assert_eq!(best.gateway, "0.0.0.0");

        let best = lookup.lookup(Ipv4Addr::new(192, 168, 7, 1)).unwrap();
        assert_eq!(best.gateway, "10.0.0.2");

        let best = lookup.lookup(Ipv4Addr::new(8, 8, 8, 8)).unwrap();
        assert_eq!(best.gateway, "10.0.0.1");
    }

    #[test]
    fn test_metric_breaks_ties_then_order() {
        let routes = vec![
            route("0.0.0.0/0.0.0.0", "10.0.0.1", 600),
            route("0.0.0.0/0.0.0.0", "192.168.1.1", 100),
            route("0.0.0.0/0", "172.16.0.1", 100),
        ];
        let best = RouteLookup::new(&routes).lookup(Ipv4Addr::new(1, 1, 1, 1)).unwrap();
        assert_eq!(best.gateway, "192.168.1.1");
    }

    #[test]
    fn test_down_and_rejecting_routes_are_skipped() {
        let mut down = route("192.168.1.0/255.255.255.0", "10.0.0.3", 0);
        down.flags = "G".to_string();
        let mut reject = route("192.168.0.0/255.255.0.0", "10.0.0.4", 0);
        reject.flags = "U,Rejected".to_string();
        let routes = vec![route("0.0.0.0/0", "10.0.0.1", 100), down, reject];

        let best = RouteLookup::new(&routes).lookup(Ipv4Addr::new(192, 168, 1, 9)).unwrap();
        assert_eq!(best.gateway, "10.0.0.1");
    }

    #[test]
    fn test_no_match() {
        let routes = vec![
            route("10.0.0.0/255.0.0.0", "0.0.0.0", 0),
            route("unk/0", "unk", 0),
        ];
        assert!(RouteLookup::new(&routes).lookup(Ipv4Addr::new(192, 0, 2, 1)).is_none());
        assert!(RouteLookup::new(&[]).lookup(Ipv4Addr::LOCALHOST).is_none());
    }
}
