//! Flow rules the way an operator states them: a protocol, a service port,
//! an address range, and which side of the conversation the range sits on.
//!
//! One stated rule covers whole sessions, so it compiles to several flow
//! patterns: each direction needs its forward half and its return half.

use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::RuleError;
use crate::openflow0x02::{Pattern, ETH_TYPE_IP, IP_PROTO_TCP, IP_PROTO_UDP};

/// Transport protocol a rule constrains.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuleProtocol {
    Ip,
    Tcp,
    Udp,
}

impl RuleProtocol {
    fn nw_proto(self) -> Option<u8> {
        match self {
            RuleProtocol::Ip => None,
            RuleProtocol::Tcp => Some(IP_PROTO_TCP),
            RuleProtocol::Udp => Some(IP_PROTO_UDP),
        }
    }
}

impl FromStr for RuleProtocol {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<RuleProtocol, RuleError> {
        if s.eq_ignore_ascii_case("ip") {
            Ok(RuleProtocol::Ip)
        } else if s.eq_ignore_ascii_case("tcp") {
            Ok(RuleProtocol::Tcp)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(RuleProtocol::Udp)
        } else {
            Err(RuleError::UnknownProtocol(s.to_string()))
        }
    }
}

/// Which side of a session the rule's address range is on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuleDirection {
    From,
    To,
    Both,
}

impl FromStr for RuleDirection {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<RuleDirection, RuleError> {
        if s.eq_ignore_ascii_case("from") {
            Ok(RuleDirection::From)
        } else if s.eq_ignore_ascii_case("to") {
            Ok(RuleDirection::To)
        } else if s.eq_ignore_ascii_case("both") {
            Ok(RuleDirection::Both)
        } else {
            Err(RuleError::UnknownDirection(s.to_string()))
        }
    }
}

/// An IPv4 address, optionally widened by a CIDR prefix.
///
/// The mask is kept in match form, where set bits mark "don't care": `/17`
/// becomes `0.0.127.255`. A bare address and `/32` both mean an exact match,
/// canonically `mask: None`. A `/0` keeps its all-ones mask here so the
/// stated address survives parsing, but compiles to a pattern with no
/// address constraint at all.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IpRange {
    pub addr: Ipv4Addr,
    pub mask: Option<Ipv4Addr>,
}

impl FromStr for IpRange {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<IpRange, RuleError> {
        let (addr_part, prefix_part) = match s.split_once('/') {
            None => (s, None),
            Some((a, p)) => (a, Some(p)),
        };
        let addr: Ipv4Addr = addr_part.parse().map_err(|_| RuleError::InvalidAddress {
            addr: addr_part.to_string(),
        })?;
        let mask = match prefix_part {
            None => None,
            Some(p) => {
                let prefix: u32 = p.parse().map_err(|_| RuleError::InvalidAddress {
                    addr: s.to_string(),
                })?;
                match prefix {
                    0 => Some(Ipv4Addr::from(u32::MAX)),
                    32 => None,
                    1..=31 => Some(Ipv4Addr::from((1u32 << (32 - prefix)) - 1)),
                    _ => return Err(RuleError::InvalidPrefix { prefix }),
                }
            }
        };
        Ok(IpRange { addr, mask })
    }
}

/// One operator-stated rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub protocol: RuleProtocol,
    pub port: u16,
    pub range: IpRange,
    pub direction: RuleDirection,
}

impl RuleSpec {
    /// Compile the rule into the flow patterns that cover it.
    ///
    /// `From` and `To` each yield two patterns, the forward half of the
    /// session and its return half; `Both` yields all four. Every pattern
    /// matches on IPv4, on the rule's transport protocol when it names one,
    /// and on the service port in the transport header. The port fields are
    /// filled for plain `ip` rules too, mirroring how Open vSwitch treats
    /// them as wildcarded once `nw_proto` is absent.
    pub fn flow_matches(&self) -> Vec<Pattern> {
        let base = Pattern {
            dl_type: Some(ETH_TYPE_IP),
            nw_proto: self.protocol.nw_proto(),
            ..Default::default()
        };
        match self.direction {
            RuleDirection::From => vec![
                self.half(&base, true, true),
                self.half(&base, false, false),
            ],
            RuleDirection::To => vec![
                self.half(&base, true, false),
                self.half(&base, false, true),
            ],
            RuleDirection::Both => vec![
                self.half(&base, true, true),
                self.half(&base, false, false),
                self.half(&base, true, false),
                self.half(&base, false, true),
            ],
        }
    }

    fn half(&self, base: &Pattern, range_on_dst: bool, port_on_src: bool) -> Pattern {
        let mut p = base.clone();
        // An all-ones mask constrains nothing; the canonical pattern leaves
        // the address pair unset.
        if self.range.mask != Some(Ipv4Addr::from(u32::MAX)) {
            if range_on_dst {
                p.nw_dst = Some(self.range.addr);
                p.nw_dst_mask = self.range.mask;
            } else {
                p.nw_src = Some(self.range.addr);
                p.nw_src_mask = self.range.mask;
            }
        }
        if port_on_src {
            p.tp_src = Some(self.port);
        } else {
            p.tp_dst = Some(self.port);
        }
        p
    }
}
