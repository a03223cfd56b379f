//! OpenFlow 1.1 (wire version 0x02) message types and their codecs.

use std::net::Ipv4Addr;

use crate::bytes::ByteCursor;
use crate::error::CodecError;

/// Wire version byte for OpenFlow 1.1.
pub const OFP_VERSION: u8 = 0x02;

/// IANA-assigned port for OpenFlow over TLS.
pub const OPENFLOW_SSL_PORT: u16 = 6653;

/// Ethernet protocol number for IPv4, used in `dl_type` matches.
pub const ETH_TYPE_IP: u16 = 0x0800;
/// IP protocol number for TCP, used in `nw_proto` matches.
pub const IP_PROTO_TCP: u8 = 6;
/// IP protocol number for UDP, used in `nw_proto` matches.
pub const IP_PROTO_UDP: u8 = 17;

/// Default priority for installed flows.
pub const DEFAULT_PRIORITY: u16 = 0x8000;

/// Byte-size of the standard match structure.
pub const MATCH_STANDARD_LEN: usize = 88;
/// Byte-size of an instruction header (type, length, 4 bytes padding).
pub const INSTRUCTION_HEADER_LEN: usize = 8;
/// Byte-size of an output action.
pub const ACTION_OUTPUT_LEN: usize = 16;
/// Byte-size of one port description in a features reply or port status.
pub const PORT_DESC_LEN: usize = 64;
/// Fixed body bytes of a features reply before the port list.
pub const FEATURES_REPLY_FIXED_LEN: usize = 24;
/// Body bytes of a switch config (flags, miss_send_len).
pub const SWITCH_CONFIG_LEN: usize = 4;
/// Fixed body bytes of a flow mod before the match.
pub const FLOW_MOD_FIXED_LEN: usize = 40;
/// Fixed body bytes of a packet-in before the frame data.
pub const PACKET_IN_FIXED_LEN: usize = 16;
/// Fixed body bytes of a flow removed before the match.
pub const FLOW_REMOVED_FIXED_LEN: usize = 40;
/// Body bytes of a port status before the port description.
pub const PORT_STATUS_FIXED_LEN: usize = 8;
/// Fixed body bytes of an error message before the raw data.
pub const ERROR_MSG_FIXED_LEN: usize = 4;

const MATCH_TYPE_STANDARD: u16 = 0;
const OFP_NO_BUFFER: u32 = 0xffff_ffff;
const OFPG_ANY: u32 = 0xffff_ffff;

/// Set or clear bit `n` of a wire flag word.
fn with_bit(word: u32, n: u32, on: bool) -> u32 {
    if on {
        word | (1 << n)
    } else {
        word & !(1 << n)
    }
}

/// Whether bit `n` of a wire flag word is set.
fn has_bit(word: u32, n: u32) -> bool {
    (word >> n) & 1 == 1
}

/// OpenFlow 1.1 message type codes, used by headers to identify meaning of the
/// rest of a message.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Experimenter,
    FeaturesReq,
    FeaturesResp,
    GetConfigReq,
    GetConfigResp,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    GroupMod,
    PortMod,
    TableMod,
    StatsReq,
    StatsResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
}

impl MsgCode {
    /// Map a wire type byte to its `MsgCode`, if it names one.
    pub fn of_int(code: u8) -> Option<MsgCode> {
        match code {
            0 => Some(MsgCode::Hello),
            1 => Some(MsgCode::Error),
            2 => Some(MsgCode::EchoReq),
            3 => Some(MsgCode::EchoResp),
            4 => Some(MsgCode::Experimenter),
            5 => Some(MsgCode::FeaturesReq),
            6 => Some(MsgCode::FeaturesResp),
            7 => Some(MsgCode::GetConfigReq),
            8 => Some(MsgCode::GetConfigResp),
            9 => Some(MsgCode::SetConfig),
            10 => Some(MsgCode::PacketIn),
            11 => Some(MsgCode::FlowRemoved),
            12 => Some(MsgCode::PortStatus),
            13 => Some(MsgCode::PacketOut),
            14 => Some(MsgCode::FlowMod),
            15 => Some(MsgCode::GroupMod),
            16 => Some(MsgCode::PortMod),
            17 => Some(MsgCode::TableMod),
            18 => Some(MsgCode::StatsReq),
            19 => Some(MsgCode::StatsResp),
            20 => Some(MsgCode::BarrierReq),
            21 => Some(MsgCode::BarrierResp),
            22 => Some(MsgCode::QueueGetConfigReq),
            23 => Some(MsgCode::QueueGetConfigResp),
            _ => None,
        }
    }
}

/// Common API for message types implementing OpenFlow Message Codes (see
/// `MsgCode` enum).
pub trait MessageType: Sized {
    /// Return the byte-size of a message.
    fn size_of(msg: &Self) -> usize;
    /// Parse a buffer into a message.
    fn parse(buf: &[u8]) -> Result<Self, CodecError>;
    /// Marshal a message into a `u8` buffer.
    fn marshal(msg: Self, bytes: &mut Vec<u8>);
}

/// Port behavior.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PseudoPort {
    PhysicalPort(u32),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller(u16),
    Local,
}

#[repr(u32)]
enum OfpPort {
    OFPPMax = 0xffff_ff00,
    OFPPInPort = 0xffff_fff8,
    OFPPTable = 0xffff_fff9,
    OFPPNormal = 0xffff_fffa,
    OFPPFlood = 0xffff_fffb,
    OFPPAll = 0xffff_fffc,
    OFPPController = 0xffff_fffd,
    OFPPLocal = 0xffff_fffe,
    OFPPAny = 0xffff_ffff,
}

impl PseudoPort {
    /// Interpret a wire port number, with `OFPPAny` mapping to `None`.
    pub fn of_int(p: u32) -> Result<Option<PseudoPort>, CodecError> {
        if (OfpPort::OFPPAny as u32) == p {
            Ok(None)
        } else {
            PseudoPort::make(p, 0).map(Some)
        }
    }

    /// Interpret a wire port number that must name a concrete port.
    pub fn make(p: u32, len: u16) -> Result<PseudoPort, CodecError> {
        match p {
            p if p == (OfpPort::OFPPInPort as u32) => Ok(PseudoPort::InPort),
            p if p == (OfpPort::OFPPTable as u32) => Ok(PseudoPort::Table),
            p if p == (OfpPort::OFPPNormal as u32) => Ok(PseudoPort::Normal),
            p if p == (OfpPort::OFPPFlood as u32) => Ok(PseudoPort::Flood),
            p if p == (OfpPort::OFPPAll as u32) => Ok(PseudoPort::AllPorts),
            p if p == (OfpPort::OFPPController as u32) => Ok(PseudoPort::Controller(len)),
            p if p == (OfpPort::OFPPLocal as u32) => Ok(PseudoPort::Local),
            _ => {
                if p <= (OfpPort::OFPPMax as u32) {
                    Ok(PseudoPort::PhysicalPort(p))
                } else {
                    Err(CodecError::UnsupportedStructureType {
                        structure: "port",
                        type_code: p,
                    })
                }
            }
        }
    }

    fn to_int(pp: PseudoPort) -> u32 {
        match pp {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u32,
            PseudoPort::Table => OfpPort::OFPPTable as u32,
            PseudoPort::Normal => OfpPort::OFPPNormal as u32,
            PseudoPort::Flood => OfpPort::OFPPFlood as u32,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u32,
            PseudoPort::Controller(_) => OfpPort::OFPPController as u32,
            PseudoPort::Local => OfpPort::OFPPLocal as u32,
        }
    }

    fn marshal(pp: PseudoPort, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&PseudoPort::to_int(pp).to_be_bytes());
    }
}

/// Fields to match against flows.
///
/// `None` wildcards a field. Flag-style fields (port, VLAN, protocol numbers,
/// MPLS, ToS) wildcard through bits in the `wildcards` word; address-shaped
/// fields (MAC, IP, metadata) wildcard through an explicit mask whose set
/// bits mark "don't care". A zero mask (exact match) is canonically `None`,
/// and an all-ones mask is the same as an absent field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    pub in_port: Option<u32>,
    pub dl_src: Option<[u8; 6]>,
    pub dl_src_mask: Option<[u8; 6]>,
    pub dl_dst: Option<[u8; 6]>,
    pub dl_dst_mask: Option<[u8; 6]>,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pcp: Option<u8>,
    pub dl_type: Option<u16>,
    pub nw_tos: Option<u8>,
    pub nw_proto: Option<u8>,
    pub nw_src: Option<Ipv4Addr>,
    pub nw_src_mask: Option<Ipv4Addr>,
    pub nw_dst: Option<Ipv4Addr>,
    pub nw_dst_mask: Option<Ipv4Addr>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
    pub mpls_label: Option<u32>,
    pub mpls_tc: Option<u8>,
    pub metadata: Option<u64>,
    pub metadata_mask: Option<u64>,
}

impl Pattern {
    /// Return the byte-size of a marshaled `Pattern`.
    pub fn size_of() -> usize {
        MATCH_STANDARD_LEN
    }

    /// Compute the wildcard word from the fields that are absent.
    pub fn wildcards(&self) -> u32 {
        let mut w = 0;
        w = with_bit(w, 0, self.in_port.is_none());
        w = with_bit(w, 1, self.dl_vlan.is_none());
        w = with_bit(w, 2, self.dl_vlan_pcp.is_none());
        w = with_bit(w, 3, self.dl_type.is_none());
        w = with_bit(w, 4, self.nw_tos.is_none());
        w = with_bit(w, 5, self.nw_proto.is_none());
        w = with_bit(w, 6, self.tp_src.is_none());
        w = with_bit(w, 7, self.tp_dst.is_none());
        w = with_bit(w, 8, self.mpls_label.is_none());
        w = with_bit(w, 9, self.mpls_tc.is_none());
        w
    }

    fn masked_mac(addr: [u8; 6], mask: [u8; 6]) -> (Option<[u8; 6]>, Option<[u8; 6]>) {
        if mask == [0xff; 6] {
            (None, None)
        } else if mask == [0; 6] {
            (Some(addr), None)
        } else {
            (Some(addr), Some(mask))
        }
    }

    fn masked_ip(addr: u32, mask: u32) -> (Option<Ipv4Addr>, Option<Ipv4Addr>) {
        if mask == u32::MAX {
            (None, None)
        } else if mask == 0 {
            (Some(Ipv4Addr::from(addr)), None)
        } else {
            (Some(Ipv4Addr::from(addr)), Some(Ipv4Addr::from(mask)))
        }
    }

    fn put_mac_pair(bytes: &mut Vec<u8>, addr: Option<[u8; 6]>, mask: Option<[u8; 6]>) {
        match addr {
            Some(a) => {
                bytes.extend_from_slice(&a);
                bytes.extend_from_slice(&mask.unwrap_or([0; 6]));
            }
            None => {
                bytes.extend_from_slice(&[0; 6]);
                bytes.extend_from_slice(&[0xff; 6]);
            }
        }
    }

    fn put_ip_pair(bytes: &mut Vec<u8>, addr: Option<Ipv4Addr>, mask: Option<Ipv4Addr>) {
        match addr {
            Some(a) => {
                bytes.extend_from_slice(&u32::from(a).to_be_bytes());
                bytes.extend_from_slice(&mask.map_or(0u32, u32::from).to_be_bytes());
            }
            None => {
                bytes.extend_from_slice(&0u32.to_be_bytes());
                bytes.extend_from_slice(&u32::MAX.to_be_bytes());
            }
        }
    }

    /// Parse one standard match from the cursor.
    pub fn parse(cur: &mut ByteCursor) -> Result<Pattern, CodecError> {
        let typ = cur.read_u16()?;
        if typ != MATCH_TYPE_STANDARD {
            return Err(CodecError::UnsupportedStructureType {
                structure: "match",
                type_code: typ as u32,
            });
        }
        let len = cur.read_u16()? as usize;
        if len != MATCH_STANDARD_LEN {
            return Err(CodecError::LengthMismatch {
                structure: "match",
                declared: len,
                actual: MATCH_STANDARD_LEN,
            });
        }
        let in_port = cur.read_u32()?;
        let w = cur.read_u32()?;
        let (dl_src, dl_src_mask) = {
            let addr = cur.read_mac()?;
            let mask = cur.read_mac()?;
            Pattern::masked_mac(addr, mask)
        };
        let (dl_dst, dl_dst_mask) = {
            let addr = cur.read_mac()?;
            let mask = cur.read_mac()?;
            Pattern::masked_mac(addr, mask)
        };
        let dl_vlan = cur.read_u16()?;
        let dl_vlan_pcp = cur.read_u8()?;
        cur.skip(1)?;
        let dl_type = cur.read_u16()?;
        let nw_tos = cur.read_u8()?;
        let nw_proto = cur.read_u8()?;
        let (nw_src, nw_src_mask) = {
            let addr = cur.read_u32()?;
            let mask = cur.read_u32()?;
            Pattern::masked_ip(addr, mask)
        };
        let (nw_dst, nw_dst_mask) = {
            let addr = cur.read_u32()?;
            let mask = cur.read_u32()?;
            Pattern::masked_ip(addr, mask)
        };
        let tp_src = cur.read_u16()?;
        let tp_dst = cur.read_u16()?;
        let mpls_label = cur.read_u32()?;
        let mpls_tc = cur.read_u8()?;
        cur.skip(3)?;
        let metadata = cur.read_u64()?;
        let metadata_mask = cur.read_u64()?;
        Ok(Pattern {
            in_port: if has_bit(w, 0) { None } else { Some(in_port) },
            dl_src,
            dl_src_mask,
            dl_dst,
            dl_dst_mask,
            dl_vlan: if has_bit(w, 1) { None } else { Some(dl_vlan) },
            dl_vlan_pcp: if has_bit(w, 2) { None } else { Some(dl_vlan_pcp) },
            dl_type: if has_bit(w, 3) { None } else { Some(dl_type) },
            nw_tos: if has_bit(w, 4) { None } else { Some(nw_tos) },
            nw_proto: if has_bit(w, 5) { None } else { Some(nw_proto) },
            nw_src,
            nw_src_mask,
            nw_dst,
            nw_dst_mask,
            tp_src: if has_bit(w, 6) { None } else { Some(tp_src) },
            tp_dst: if has_bit(w, 7) { None } else { Some(tp_dst) },
            mpls_label: if has_bit(w, 8) { None } else { Some(mpls_label) },
            mpls_tc: if has_bit(w, 9) { None } else { Some(mpls_tc) },
            metadata: if metadata_mask == u64::MAX {
                None
            } else {
                Some(metadata)
            },
            metadata_mask: if metadata_mask == u64::MAX || metadata_mask == 0 {
                None
            } else {
                Some(metadata_mask)
            },
        })
    }

    fn marshal(p: Pattern, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&MATCH_TYPE_STANDARD.to_be_bytes());
        bytes.extend_from_slice(&(MATCH_STANDARD_LEN as u16).to_be_bytes());
        bytes.extend_from_slice(&p.in_port.unwrap_or(0).to_be_bytes());
        bytes.extend_from_slice(&p.wildcards().to_be_bytes());
        Pattern::put_mac_pair(bytes, p.dl_src, p.dl_src_mask);
        Pattern::put_mac_pair(bytes, p.dl_dst, p.dl_dst_mask);
        bytes.extend_from_slice(&p.dl_vlan.unwrap_or(0).to_be_bytes());
        bytes.push(p.dl_vlan_pcp.unwrap_or(0));
        bytes.push(0);
        bytes.extend_from_slice(&p.dl_type.unwrap_or(0).to_be_bytes());
        bytes.push(p.nw_tos.unwrap_or(0));
        bytes.push(p.nw_proto.unwrap_or(0));
        Pattern::put_ip_pair(bytes, p.nw_src, p.nw_src_mask);
        Pattern::put_ip_pair(bytes, p.nw_dst, p.nw_dst_mask);
        bytes.extend_from_slice(&p.tp_src.unwrap_or(0).to_be_bytes());
        bytes.extend_from_slice(&p.tp_dst.unwrap_or(0).to_be_bytes());
        bytes.extend_from_slice(&p.mpls_label.unwrap_or(0).to_be_bytes());
        bytes.push(p.mpls_tc.unwrap_or(0));
        bytes.extend_from_slice(&[0; 3]);
        match p.metadata {
            Some(m) => {
                bytes.extend_from_slice(&m.to_be_bytes());
                bytes.extend_from_slice(&p.metadata_mask.unwrap_or(0).to_be_bytes());
            }
            None => {
                bytes.extend_from_slice(&0u64.to_be_bytes());
                bytes.extend_from_slice(&u64::MAX.to_be_bytes());
            }
        }
    }
}

/// Actions associated with flows and packets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Output(PseudoPort),
}

#[repr(u16)]
enum OfpActionType {
    OFPATOutput = 0,
    // OFPATSetVlanVId,
    // OFPATSetVlanPCP,
    // OFPATSetDlSrc,
    // OFPATSetDlDst,
    // OFPATSetNwSrc,
    // OFPATSetNwDst,
    // OFPATSetNwTos,
    // OFPATSetTpSrc,
    // OFPATSetTpDst,
    // OFPATGroup ...
}

impl Action {
    fn type_code(a: &Action) -> OfpActionType {
        match *a {
            Action::Output(_) => OfpActionType::OFPATOutput,
        }
    }

    fn size_of(a: &Action) -> usize {
        match *a {
            Action::Output(_) => ACTION_OUTPUT_LEN,
        }
    }

    fn size_of_sequence(actions: &[Action]) -> usize {
        actions.iter().map(Action::size_of).sum()
    }

    fn parse_one(cur: &mut ByteCursor) -> Result<Action, CodecError> {
        let action_code = cur.read_u16()?;
        let len = cur.read_u16()? as usize;
        match action_code {
            t if t == (OfpActionType::OFPATOutput as u16) => {
                if len != ACTION_OUTPUT_LEN {
                    return Err(CodecError::LengthMismatch {
                        structure: "action",
                        declared: len,
                        actual: ACTION_OUTPUT_LEN,
                    });
                }
                let port = cur.read_u32()?;
                let max_len = cur.read_u16()?;
                cur.skip(6)?;
                Ok(Action::Output(PseudoPort::make(port, max_len)?))
            }
            t => Err(CodecError::UnsupportedStructureType {
                structure: "action",
                type_code: t as u32,
            }),
        }
    }

    fn parse_sequence(cur: &mut ByteCursor) -> Result<Vec<Action>, CodecError> {
        let mut actions = vec![];
        while cur.remaining() > 0 {
            actions.push(Action::parse_one(cur)?);
        }
        Ok(actions)
    }

    fn marshal(act: Action, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&(Action::type_code(&act) as u16).to_be_bytes());
        bytes.extend_from_slice(&(Action::size_of(&act) as u16).to_be_bytes());
        match act {
            Action::Output(pp) => {
                PseudoPort::marshal(pp, bytes);
                bytes.extend_from_slice(
                    &match pp {
                        PseudoPort::Controller(w) => w,
                        _ => 0,
                    }
                    .to_be_bytes(),
                );
                bytes.extend_from_slice(&[0; 6]);
            }
        }
    }
}

/// Instructions applied to packets matching a flow entry. Action order is
/// significant and preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    WriteActions(Vec<Action>),
    ApplyActions(Vec<Action>),
    ClearActions,
}

#[repr(u16)]
enum OfpInstructionType {
    // OFPITGotoTable = 1,
    // OFPITWriteMetadata = 2,
    OFPITWriteActions = 3,
    OFPITApplyActions = 4,
    OFPITClearActions = 5,
}

impl Instruction {
    fn type_code(i: &Instruction) -> OfpInstructionType {
        match *i {
            Instruction::WriteActions(_) => OfpInstructionType::OFPITWriteActions,
            Instruction::ApplyActions(_) => OfpInstructionType::OFPITApplyActions,
            Instruction::ClearActions => OfpInstructionType::OFPITClearActions,
        }
    }

    fn size_of(i: &Instruction) -> usize {
        let actions = match *i {
            Instruction::WriteActions(ref acts) | Instruction::ApplyActions(ref acts) => {
                Action::size_of_sequence(acts)
            }
            Instruction::ClearActions => 0,
        };
        INSTRUCTION_HEADER_LEN + actions
    }

    fn size_of_sequence(instructions: &[Instruction]) -> usize {
        instructions.iter().map(Instruction::size_of).sum()
    }

    fn parse_one(cur: &mut ByteCursor) -> Result<Instruction, CodecError> {
        let type_code = cur.read_u16()?;
        let len = cur.read_u16()? as usize;
        if len < INSTRUCTION_HEADER_LEN {
            return Err(CodecError::LengthMismatch {
                structure: "instruction",
                declared: len,
                actual: INSTRUCTION_HEADER_LEN,
            });
        }
        cur.skip(4)?;
        let body = cur.read_bytes(len - INSTRUCTION_HEADER_LEN)?;
        let mut actions = ByteCursor::new(body);
        match type_code {
            t if t == (OfpInstructionType::OFPITWriteActions as u16) => {
                Ok(Instruction::WriteActions(Action::parse_sequence(
                    &mut actions,
                )?))
            }
            t if t == (OfpInstructionType::OFPITApplyActions as u16) => {
                Ok(Instruction::ApplyActions(Action::parse_sequence(
                    &mut actions,
                )?))
            }
            t if t == (OfpInstructionType::OFPITClearActions as u16) => {
                if actions.remaining() != 0 {
                    return Err(CodecError::LengthMismatch {
                        structure: "instruction",
                        declared: len,
                        actual: INSTRUCTION_HEADER_LEN,
                    });
                }
                Ok(Instruction::ClearActions)
            }
            t => Err(CodecError::UnsupportedStructureType {
                structure: "instruction",
                type_code: t as u32,
            }),
        }
    }

    fn parse_sequence(cur: &mut ByteCursor) -> Result<Vec<Instruction>, CodecError> {
        let mut instructions = vec![];
        while cur.remaining() > 0 {
            instructions.push(Instruction::parse_one(cur)?);
        }
        Ok(instructions)
    }

    fn marshal(i: Instruction, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&(Instruction::type_code(&i) as u16).to_be_bytes());
        bytes.extend_from_slice(&(Instruction::size_of(&i) as u16).to_be_bytes());
        bytes.extend_from_slice(&[0; 4]);
        match i {
            Instruction::WriteActions(acts) | Instruction::ApplyActions(acts) => {
                for act in acts {
                    Action::marshal(act, bytes);
                }
            }
            Instruction::ClearActions => (),
        }
    }
}

/// How long before a flow entry expires.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    fn to_int(tm: Timeout) -> u16 {
        match tm {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// Capabilities supported by the datapath.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
    pub group_stats: bool,
    pub ip_reasm: bool,
    pub queue_stats: bool,
    pub arp_match_ip: bool,
}

impl Capabilities {
    fn of_int(d: u32) -> Capabilities {
        Capabilities {
            flow_stats: has_bit(d, 0),
            table_stats: has_bit(d, 1),
            port_stats: has_bit(d, 2),
            group_stats: has_bit(d, 3),
            ip_reasm: has_bit(d, 5),
            queue_stats: has_bit(d, 6),
            arp_match_ip: has_bit(d, 7),
        }
    }

    fn to_int(c: Capabilities) -> u32 {
        let mut d = 0;
        d = with_bit(d, 0, c.flow_stats);
        d = with_bit(d, 1, c.table_stats);
        d = with_bit(d, 2, c.port_stats);
        d = with_bit(d, 3, c.group_stats);
        d = with_bit(d, 5, c.ip_reasm);
        d = with_bit(d, 6, c.queue_stats);
        d = with_bit(d, 7, c.arp_match_ip);
        d
    }
}

/// Switch features, reported once per handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub supported_capabilities: Capabilities,
    pub ports: Vec<PortDesc>,
}

impl MessageType for SwitchFeatures {
    fn size_of(sf: &SwitchFeatures) -> usize {
        FEATURES_REPLY_FIXED_LEN + sf.ports.len() * PORT_DESC_LEN
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures, CodecError> {
        let mut cur = ByteCursor::new(buf);
        let datapath_id = cur.read_u64()?;
        let num_buffers = cur.read_u32()?;
        let num_tables = cur.read_u8()?;
        cur.skip(3)?;
        let supported_capabilities = Capabilities::of_int(cur.read_u32()?);
        cur.skip(4)?;
        let ports = {
            let rem = cur.remaining();
            if rem % PORT_DESC_LEN != 0 {
                return Err(CodecError::LengthMismatch {
                    structure: "port description list",
                    declared: rem,
                    actual: rem - rem % PORT_DESC_LEN,
                });
            }
            let mut v = vec![];
            for _ in 0..rem / PORT_DESC_LEN {
                v.push(PortDesc::parse(&mut cur)?);
            }
            v
        };
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            supported_capabilities,
            ports,
        })
    }

    fn marshal(sf: SwitchFeatures, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&sf.datapath_id.to_be_bytes());
        bytes.extend_from_slice(&sf.num_buffers.to_be_bytes());
        bytes.push(sf.num_tables);
        bytes.extend_from_slice(&[0; 3]);
        bytes.extend_from_slice(&Capabilities::to_int(sf.supported_capabilities).to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        for pd in sf.ports {
            PortDesc::marshal(pd, bytes);
        }
    }
}

/// Fragment handling and miss-send behavior of the switch.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl SwitchConfig {
    /// Fragment policy bits of `flags`.
    pub const FRAG_NORMAL: u16 = 0;
    pub const FRAG_DROP: u16 = 1 << 0;
    pub const FRAG_REASM: u16 = 1 << 1;
    pub const FRAG_MASK: u16 = 3;
    /// Send packets with invalid TTL to the controller.
    pub const INVALID_TTL_TO_CONTROLLER: u16 = 1 << 2;
}

impl MessageType for SwitchConfig {
    fn size_of(_: &SwitchConfig) -> usize {
        SWITCH_CONFIG_LEN
    }

    fn parse(buf: &[u8]) -> Result<SwitchConfig, CodecError> {
        if buf.len() != SWITCH_CONFIG_LEN {
            return Err(CodecError::LengthMismatch {
                structure: "switch config",
                declared: buf.len(),
                actual: SWITCH_CONFIG_LEN,
            });
        }
        let mut cur = ByteCursor::new(buf);
        Ok(SwitchConfig {
            flags: cur.read_u16()?,
            miss_send_len: cur.read_u16()?,
        })
    }

    fn marshal(sc: SwitchConfig, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&sc.flags.to_be_bytes());
        bytes.extend_from_slice(&sc.miss_send_len.to_be_bytes());
    }
}

/// Type of modification to perform on a flow table.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    fn of_int(d: u8) -> Result<FlowModCmd, CodecError> {
        match d {
            0 => Ok(FlowModCmd::AddFlow),
            1 => Ok(FlowModCmd::ModFlow),
            2 => Ok(FlowModCmd::ModStrictFlow),
            3 => Ok(FlowModCmd::DeleteFlow),
            4 => Ok(FlowModCmd::DeleteStrictFlow),
            t => Err(CodecError::UnsupportedStructureType {
                structure: "flow-mod command",
                type_code: t as u32,
            }),
        }
    }
}

/// Represents modifications to a flow table from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub table_id: u8,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub pattern: Pattern,
    pub priority: u16,
    pub instructions: Vec<Instruction>,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub out_group: Option<u32>,
    pub check_overlap: bool,
}

impl FlowMod {
    fn flags_to_int(check_overlap: bool, notify_when_removed: bool) -> u16 {
        (if check_overlap { 1 << 1 } else { 0 }) | (if notify_when_removed { 1 << 0 } else { 0 })
    }

    fn check_overlap_of_flags(flags: u16) -> bool {
        2 & flags != 0
    }

    fn notify_when_removed_of_flags(flags: u16) -> bool {
        1 & flags != 0
    }
}

impl MessageType for FlowMod {
    fn size_of(msg: &FlowMod) -> usize {
        FLOW_MOD_FIXED_LEN + Pattern::size_of() + Instruction::size_of_sequence(&msg.instructions)
    }

    fn parse(buf: &[u8]) -> Result<FlowMod, CodecError> {
        let mut cur = ByteCursor::new(buf);
        let cookie = cur.read_u64()?;
        let cookie_mask = cur.read_u64()?;
        let table_id = cur.read_u8()?;
        let command = FlowModCmd::of_int(cur.read_u8()?)?;
        let idle = Timeout::of_int(cur.read_u16()?);
        let hard = Timeout::of_int(cur.read_u16()?);
        let prio = cur.read_u16()?;
        let buffer_id = cur.read_u32()?;
        let out_port = PseudoPort::of_int(cur.read_u32()?)?;
        let out_group = {
            let g = cur.read_u32()?;
            if g == OFPG_ANY {
                None
            } else {
                Some(g)
            }
        };
        let flags = cur.read_u16()?;
        cur.skip(2)?;
        let pattern = Pattern::parse(&mut cur)?;
        let instructions = Instruction::parse_sequence(&mut cur)?;
        Ok(FlowMod {
            command,
            table_id,
            cookie,
            cookie_mask,
            pattern,
            priority: prio,
            instructions,
            idle_timeout: idle,
            hard_timeout: hard,
            notify_when_removed: FlowMod::notify_when_removed_of_flags(flags),
            apply_to_packet: {
                match buffer_id {
                    OFP_NO_BUFFER => None,
                    n => Some(n),
                }
            },
            out_port,
            out_group,
            check_overlap: FlowMod::check_overlap_of_flags(flags),
        })
    }

    fn marshal(fm: FlowMod, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&fm.cookie.to_be_bytes());
        bytes.extend_from_slice(&fm.cookie_mask.to_be_bytes());
        bytes.push(fm.table_id);
        bytes.push(fm.command as u8);
        bytes.extend_from_slice(&Timeout::to_int(fm.idle_timeout).to_be_bytes());
        bytes.extend_from_slice(&Timeout::to_int(fm.hard_timeout).to_be_bytes());
        bytes.extend_from_slice(&fm.priority.to_be_bytes());
        bytes.extend_from_slice(&fm.apply_to_packet.unwrap_or(OFP_NO_BUFFER).to_be_bytes());
        match fm.out_port {
            None => bytes.extend_from_slice(&(OfpPort::OFPPAny as u32).to_be_bytes()),
            Some(x) => PseudoPort::marshal(x, bytes),
        }
        bytes.extend_from_slice(&fm.out_group.unwrap_or(OFPG_ANY).to_be_bytes());
        bytes.extend_from_slice(
            &FlowMod::flags_to_int(fm.check_overlap, fm.notify_when_removed).to_be_bytes(),
        );
        bytes.extend_from_slice(&[0; 2]);
        Pattern::marshal(fm.pattern, bytes);
        for instruction in fm.instructions {
            Instruction::marshal(instruction, bytes);
        }
    }
}

/// The data associated with a packet received by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn size_of(payload: &Payload) -> usize {
        match *payload {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf.len(),
        }
    }
}

/// The reason a packet arrives at the controller.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch,
    ExplicitSend,
}

impl PacketInReason {
    fn of_int(d: u8) -> Result<PacketInReason, CodecError> {
        match d {
            0 => Ok(PacketInReason::NoMatch),
            1 => Ok(PacketInReason::ExplicitSend),
            t => Err(CodecError::UnsupportedStructureType {
                structure: "packet-in reason",
                type_code: t as u32,
            }),
        }
    }
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub port: u32,
    pub in_phy_port: u32,
    pub reason: PacketInReason,
    pub table_id: u8,
}

impl MessageType for PacketIn {
    fn size_of(pi: &PacketIn) -> usize {
        PACKET_IN_FIXED_LEN + Payload::size_of(&pi.input_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketIn, CodecError> {
        let mut cur = ByteCursor::new(buf);
        let buf_id = match cur.read_u32()? {
            OFP_NO_BUFFER => None,
            n => Some(n),
        };
        let port = cur.read_u32()?;
        let in_phy_port = cur.read_u32()?;
        let total_len = cur.read_u16()?;
        let reason = PacketInReason::of_int(cur.read_u8()?)?;
        let table_id = cur.read_u8()?;
        let pk = cur.rest().to_vec();
        let payload = match buf_id {
            None => Payload::NotBuffered(pk),
            Some(n) => Payload::Buffered(n, pk),
        };
        Ok(PacketIn {
            input_payload: payload,
            total_len,
            port,
            in_phy_port,
            reason,
            table_id,
        })
    }

    fn marshal(pi: PacketIn, bytes: &mut Vec<u8>) {
        let (buf_id, pk) = match pi.input_payload {
            Payload::Buffered(n, buf) => (n, buf),
            Payload::NotBuffered(buf) => (OFP_NO_BUFFER, buf),
        };
        bytes.extend_from_slice(&buf_id.to_be_bytes());
        bytes.extend_from_slice(&pi.port.to_be_bytes());
        bytes.extend_from_slice(&pi.in_phy_port.to_be_bytes());
        bytes.extend_from_slice(&pi.total_len.to_be_bytes());
        bytes.push(pi.reason as u8);
        bytes.push(pi.table_id);
        bytes.extend_from_slice(&pk);
    }
}

/// Features of physical ports available in a datapath.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PortFeatures {
    pub f_10mbhd: bool,
    pub f_10mbfd: bool,
    pub f_100mbhd: bool,
    pub f_100mbfd: bool,
    pub f_1gbhd: bool,
    pub f_1gbfd: bool,
    pub f_10gbfd: bool,
    pub f_40gbfd: bool,
    pub f_100gbfd: bool,
    pub f_1tbfd: bool,
    pub other: bool,
    pub copper: bool,
    pub fiber: bool,
    pub autoneg: bool,
    pub pause: bool,
    pub pause_asym: bool,
}

impl PortFeatures {
    fn of_int(d: u32) -> PortFeatures {
        PortFeatures {
            f_10mbhd: has_bit(d, 0),
            f_10mbfd: has_bit(d, 1),
            f_100mbhd: has_bit(d, 2),
            f_100mbfd: has_bit(d, 3),
            f_1gbhd: has_bit(d, 4),
            f_1gbfd: has_bit(d, 5),
            f_10gbfd: has_bit(d, 6),
            f_40gbfd: has_bit(d, 7),
            f_100gbfd: has_bit(d, 8),
            f_1tbfd: has_bit(d, 9),
            other: has_bit(d, 10),
            copper: has_bit(d, 11),
            fiber: has_bit(d, 12),
            autoneg: has_bit(d, 13),
            pause: has_bit(d, 14),
            pause_asym: has_bit(d, 15),
        }
    }

    fn to_int(pf: PortFeatures) -> u32 {
        let mut d = 0;
        d = with_bit(d, 0, pf.f_10mbhd);
        d = with_bit(d, 1, pf.f_10mbfd);
        d = with_bit(d, 2, pf.f_100mbhd);
        d = with_bit(d, 3, pf.f_100mbfd);
        d = with_bit(d, 4, pf.f_1gbhd);
        d = with_bit(d, 5, pf.f_1gbfd);
        d = with_bit(d, 6, pf.f_10gbfd);
        d = with_bit(d, 7, pf.f_40gbfd);
        d = with_bit(d, 8, pf.f_100gbfd);
        d = with_bit(d, 9, pf.f_1tbfd);
        d = with_bit(d, 10, pf.other);
        d = with_bit(d, 11, pf.copper);
        d = with_bit(d, 12, pf.fiber);
        d = with_bit(d, 13, pf.autoneg);
        d = with_bit(d, 14, pf.pause);
        d = with_bit(d, 15, pf.pause_asym);
        d
    }
}

/// Flags to indicate behavior of the physical port.
///
/// These flags are used both to describe the current configuration of a
/// physical port, and to configure a port's behavior.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PortConfig {
    pub down: bool,
    pub no_recv: bool,
    pub no_fwd: bool,
    pub no_packet_in: bool,
}

impl PortConfig {
    fn of_int(d: u32) -> PortConfig {
        PortConfig {
            down: has_bit(d, 0),
            no_recv: has_bit(d, 2),
            no_fwd: has_bit(d, 5),
            no_packet_in: has_bit(d, 6),
        }
    }

    fn to_int(pc: PortConfig) -> u32 {
        let mut d = 0;
        d = with_bit(d, 0, pc.down);
        d = with_bit(d, 2, pc.no_recv);
        d = with_bit(d, 5, pc.no_fwd);
        d = with_bit(d, 6, pc.no_packet_in);
        d
    }
}

/// Current state of a physical port. Not configurable by the controller.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PortState {
    pub link_down: bool,
    pub blocked: bool,
    pub live: bool,
}

impl PortState {
    fn of_int(d: u32) -> PortState {
        PortState {
            link_down: has_bit(d, 0),
            blocked: has_bit(d, 1),
            live: has_bit(d, 2),
        }
    }

    fn to_int(ps: PortState) -> u32 {
        let mut d = 0;
        d = with_bit(d, 0, ps.link_down);
        d = with_bit(d, 1, ps.blocked);
        d = with_bit(d, 2, ps.live);
        d
    }
}

/// Description of a physical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u32,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
    pub curr_speed: u32,
    pub max_speed: u32,
}

impl PortDesc {
    fn size_of(_: &PortDesc) -> usize {
        PORT_DESC_LEN
    }

    fn parse(cur: &mut ByteCursor) -> Result<PortDesc, CodecError> {
        let port_no = cur.read_u32()?;
        cur.skip(4)?;
        let hw_addr = cur.read_mac()?;
        cur.skip(2)?;
        let name = {
            let raw = cur.read_bytes(16)?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(16);
            String::from_utf8_lossy(&raw[..end]).into_owned()
        };
        let config = PortConfig::of_int(cur.read_u32()?);
        let state = PortState::of_int(cur.read_u32()?);
        let curr = PortFeatures::of_int(cur.read_u32()?);
        let advertised = PortFeatures::of_int(cur.read_u32()?);
        let supported = PortFeatures::of_int(cur.read_u32()?);
        let peer = PortFeatures::of_int(cur.read_u32()?);
        let curr_speed = cur.read_u32()?;
        let max_speed = cur.read_u32()?;
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
            curr_speed,
            max_speed,
        })
    }

    fn marshal(pd: PortDesc, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&pd.port_no.to_be_bytes());
        bytes.extend_from_slice(&[0; 4]);
        bytes.extend_from_slice(&pd.hw_addr);
        bytes.extend_from_slice(&[0; 2]);
        let mut name = [0u8; 16];
        let n = pd.name.len().min(16);
        name[..n].copy_from_slice(&pd.name.as_bytes()[..n]);
        bytes.extend_from_slice(&name);
        bytes.extend_from_slice(&PortConfig::to_int(pd.config).to_be_bytes());
        bytes.extend_from_slice(&PortState::to_int(pd.state).to_be_bytes());
        bytes.extend_from_slice(&PortFeatures::to_int(pd.curr).to_be_bytes());
        bytes.extend_from_slice(&PortFeatures::to_int(pd.advertised).to_be_bytes());
        bytes.extend_from_slice(&PortFeatures::to_int(pd.supported).to_be_bytes());
        bytes.extend_from_slice(&PortFeatures::to_int(pd.peer).to_be_bytes());
        bytes.extend_from_slice(&pd.curr_speed.to_be_bytes());
        bytes.extend_from_slice(&pd.max_speed.to_be_bytes());
    }
}

/// What changed about a physical port.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
}

impl PortReason {
    fn of_int(d: u8) -> Result<PortReason, CodecError> {
        match d {
            0 => Ok(PortReason::PortAdd),
            1 => Ok(PortReason::PortDelete),
            2 => Ok(PortReason::PortModify),
            t => Err(CodecError::UnsupportedStructureType {
                structure: "port-status reason",
                type_code: t as u32,
            }),
        }
    }
}

/// A physical port has changed in the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

impl MessageType for PortStatus {
    fn size_of(_: &PortStatus) -> usize {
        PORT_STATUS_FIXED_LEN + PORT_DESC_LEN
    }

    fn parse(buf: &[u8]) -> Result<PortStatus, CodecError> {
        let mut cur = ByteCursor::new(buf);
        let reason = PortReason::of_int(cur.read_u8()?)?;
        cur.skip(7)?;
        let desc = PortDesc::parse(&mut cur)?;
        if cur.remaining() != 0 {
            return Err(CodecError::LengthMismatch {
                structure: "port status",
                declared: buf.len(),
                actual: cur.consumed(),
            });
        }
        Ok(PortStatus { reason, desc })
    }

    fn marshal(ps: PortStatus, bytes: &mut Vec<u8>) {
        bytes.push(ps.reason as u8);
        bytes.extend_from_slice(&[0; 7]);
        PortDesc::marshal(ps.desc, bytes);
    }
}

/// Why a flow entry left the flow table.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
    GroupDelete,
}

impl FlowRemovedReason {
    fn of_int(d: u8) -> Result<FlowRemovedReason, CodecError> {
        match d {
            0 => Ok(FlowRemovedReason::IdleTimeout),
            1 => Ok(FlowRemovedReason::HardTimeout),
            2 => Ok(FlowRemovedReason::Delete),
            3 => Ok(FlowRemovedReason::GroupDelete),
            t => Err(CodecError::UnsupportedStructureType {
                structure: "flow-removed reason",
                type_code: t as u32,
            }),
        }
    }
}

/// A flow entry was removed from a flow table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRemoved {
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: Timeout,
    pub packet_count: u64,
    pub byte_count: u64,
    pub pattern: Pattern,
}

impl MessageType for FlowRemoved {
    fn size_of(_: &FlowRemoved) -> usize {
        FLOW_REMOVED_FIXED_LEN + MATCH_STANDARD_LEN
    }

    fn parse(buf: &[u8]) -> Result<FlowRemoved, CodecError> {
        let mut cur = ByteCursor::new(buf);
        let cookie = cur.read_u64()?;
        let priority = cur.read_u16()?;
        let reason = FlowRemovedReason::of_int(cur.read_u8()?)?;
        let table_id = cur.read_u8()?;
        let duration_sec = cur.read_u32()?;
        let duration_nsec = cur.read_u32()?;
        let idle_timeout = Timeout::of_int(cur.read_u16()?);
        cur.skip(2)?;
        let packet_count = cur.read_u64()?;
        let byte_count = cur.read_u64()?;
        let pattern = Pattern::parse(&mut cur)?;
        if cur.remaining() != 0 {
            return Err(CodecError::LengthMismatch {
                structure: "flow removed",
                declared: buf.len(),
                actual: cur.consumed(),
            });
        }
        Ok(FlowRemoved {
            cookie,
            priority,
            reason,
            table_id,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count,
            byte_count,
            pattern,
        })
    }

    fn marshal(fr: FlowRemoved, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&fr.cookie.to_be_bytes());
        bytes.extend_from_slice(&fr.priority.to_be_bytes());
        bytes.push(fr.reason as u8);
        bytes.push(fr.table_id);
        bytes.extend_from_slice(&fr.duration_sec.to_be_bytes());
        bytes.extend_from_slice(&fr.duration_nsec.to_be_bytes());
        bytes.extend_from_slice(&Timeout::to_int(fr.idle_timeout).to_be_bytes());
        bytes.extend_from_slice(&[0; 2]);
        bytes.extend_from_slice(&fr.packet_count.to_be_bytes());
        bytes.extend_from_slice(&fr.byte_count.to_be_bytes());
        Pattern::marshal(fr.pattern, bytes);
    }
}

/// An error reported by the switch. The data bytes are kept opaque; for most
/// error types they hold the offending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub error_type: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl MessageType for ErrorMsg {
    fn size_of(e: &ErrorMsg) -> usize {
        ERROR_MSG_FIXED_LEN + e.data.len()
    }

    fn parse(buf: &[u8]) -> Result<ErrorMsg, CodecError> {
        let mut cur = ByteCursor::new(buf);
        let error_type = cur.read_u16()?;
        let code = cur.read_u16()?;
        let data = cur.rest().to_vec();
        Ok(ErrorMsg {
            error_type,
            code,
            data,
        })
    }

    fn marshal(e: ErrorMsg, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&e.error_type.to_be_bytes());
        bytes.extend_from_slice(&e.code.to_be_bytes());
        bytes.extend_from_slice(&e.data);
    }
}

/// Encapsulates handling of messages implementing `MessageType` trait.
pub mod message {
    use super::*;
    use crate::error::CodecError;
    use crate::ofp_header::OfpHeader;
    use crate::ofp_message::OfpMessage;

    /// Abstractions of OpenFlow messages mapping to message codes.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Message {
        Hello,
        Error(ErrorMsg),
        EchoRequest(Vec<u8>),
        EchoReply(Vec<u8>),
        FeaturesReq,
        FeaturesReply(SwitchFeatures),
        GetConfigReq,
        GetConfigReply(SwitchConfig),
        SetConfig(SwitchConfig),
        FlowMod(FlowMod),
        PacketIn(PacketIn),
        FlowRemoved(FlowRemoved),
        PortStatus(PortStatus),
    }

    impl Message {
        /// Map `Message` to associated OpenFlow message type code `MsgCode`.
        pub fn msg_code_of_message(msg: &Message) -> MsgCode {
            match *msg {
                Message::Hello => MsgCode::Hello,
                Message::Error(_) => MsgCode::Error,
                Message::EchoRequest(_) => MsgCode::EchoReq,
                Message::EchoReply(_) => MsgCode::EchoResp,
                Message::FeaturesReq => MsgCode::FeaturesReq,
                Message::FeaturesReply(_) => MsgCode::FeaturesResp,
                Message::GetConfigReq => MsgCode::GetConfigReq,
                Message::GetConfigReply(_) => MsgCode::GetConfigResp,
                Message::SetConfig(_) => MsgCode::SetConfig,
                Message::FlowMod(_) => MsgCode::FlowMod,
                Message::PacketIn(_) => MsgCode::PacketIn,
                Message::FlowRemoved(_) => MsgCode::FlowRemoved,
                Message::PortStatus(_) => MsgCode::PortStatus,
            }
        }

        fn marshal_body(msg: Message, bytes: &mut Vec<u8>) {
            match msg {
                Message::Hello => (),
                Message::Error(e) => ErrorMsg::marshal(e, bytes),
                Message::EchoRequest(buf) | Message::EchoReply(buf) => {
                    bytes.extend_from_slice(&buf);
                }
                Message::FeaturesReq => (),
                Message::FeaturesReply(sf) => SwitchFeatures::marshal(sf, bytes),
                Message::GetConfigReq => (),
                Message::GetConfigReply(sc) | Message::SetConfig(sc) => {
                    SwitchConfig::marshal(sc, bytes)
                }
                Message::FlowMod(flow_mod) => FlowMod::marshal(flow_mod, bytes),
                Message::PacketIn(packet_in) => PacketIn::marshal(packet_in, bytes),
                Message::FlowRemoved(fr) => FlowRemoved::marshal(fr, bytes),
                Message::PortStatus(sts) => PortStatus::marshal(sts, bytes),
            }
        }

        fn ensure_empty(buf: &[u8], structure: &'static str) -> Result<(), CodecError> {
            if buf.is_empty() {
                Ok(())
            } else {
                Err(CodecError::LengthMismatch {
                    structure,
                    declared: buf.len(),
                    actual: 0,
                })
            }
        }
    }

    impl OfpMessage for Message {
        fn size_of(msg: &Message) -> usize {
            match *msg {
                Message::Hello => OfpHeader::size(),
                Message::Error(ref e) => OfpHeader::size() + ErrorMsg::size_of(e),
                Message::EchoRequest(ref buf) | Message::EchoReply(ref buf) => {
                    OfpHeader::size() + buf.len()
                }
                Message::FeaturesReq => OfpHeader::size(),
                Message::FeaturesReply(ref sf) => OfpHeader::size() + SwitchFeatures::size_of(sf),
                Message::GetConfigReq => OfpHeader::size(),
                Message::GetConfigReply(ref sc) | Message::SetConfig(ref sc) => {
                    OfpHeader::size() + SwitchConfig::size_of(sc)
                }
                Message::FlowMod(ref flow_mod) => OfpHeader::size() + FlowMod::size_of(flow_mod),
                Message::PacketIn(ref packet_in) => OfpHeader::size() + PacketIn::size_of(packet_in),
                Message::FlowRemoved(ref fr) => OfpHeader::size() + FlowRemoved::size_of(fr),
                Message::PortStatus(ref ps) => OfpHeader::size() + PortStatus::size_of(ps),
            }
        }

        fn header_of(xid: u32, msg: &Message) -> OfpHeader {
            let sizeof_buf = Self::size_of(msg);
            OfpHeader::new(
                OFP_VERSION,
                Message::msg_code_of_message(msg) as u8,
                sizeof_buf as u16,
                xid,
            )
        }

        fn marshal(xid: u32, msg: Message) -> Vec<u8> {
            let hdr = Self::header_of(xid, &msg);
            let mut bytes = vec![];
            OfpHeader::marshal(&mut bytes, hdr);
            Message::marshal_body(msg, &mut bytes);
            bytes
        }

        fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Message), CodecError> {
            let typ = MsgCode::of_int(header.type_code()).ok_or(
                CodecError::UnsupportedMessageType {
                    version: header.version(),
                    type_code: header.type_code(),
                },
            )?;
            let msg = match typ {
                // Trailing hello bytes are version-negotiation elements from
                // later protocol revisions; they are ignored, not rejected.
                MsgCode::Hello => Message::Hello,
                MsgCode::Error => Message::Error(ErrorMsg::parse(buf)?),
                MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
                MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
                MsgCode::FeaturesReq => {
                    Message::ensure_empty(buf, "features request")?;
                    Message::FeaturesReq
                }
                MsgCode::FeaturesResp => Message::FeaturesReply(SwitchFeatures::parse(buf)?),
                MsgCode::GetConfigReq => {
                    Message::ensure_empty(buf, "get-config request")?;
                    Message::GetConfigReq
                }
                MsgCode::GetConfigResp => Message::GetConfigReply(SwitchConfig::parse(buf)?),
                MsgCode::SetConfig => Message::SetConfig(SwitchConfig::parse(buf)?),
                MsgCode::FlowMod => Message::FlowMod(FlowMod::parse(buf)?),
                MsgCode::PacketIn => Message::PacketIn(PacketIn::parse(buf)?),
                MsgCode::FlowRemoved => Message::FlowRemoved(FlowRemoved::parse(buf)?),
                MsgCode::PortStatus => Message::PortStatus(PortStatus::parse(buf)?),
                other => {
                    return Err(CodecError::UnsupportedMessageType {
                        version: header.version(),
                        type_code: other as u8,
                    })
                }
            };
            Ok((header.xid(), msg))
        }
    }

    /// Return a `FlowMod` adding a flow parameterized by the given `priority`,
    /// `pattern`, and `instructions`.
    pub fn add_flow(prio: u16, pattern: Pattern, instructions: Vec<Instruction>) -> FlowMod {
        FlowMod {
            command: FlowModCmd::AddFlow,
            table_id: 0,
            cookie: 0,
            cookie_mask: 0,
            pattern,
            priority: prio,
            instructions,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: true,
            apply_to_packet: None,
            out_port: None,
            out_group: None,
            check_overlap: false,
        }
    }

    /// Return a `FlowMod` deleting every flow matching `pattern`. Deletion is
    /// non-strict: priority and instructions of installed flows are not
    /// compared, and any out-port/out-group is accepted.
    pub fn delete_flows(pattern: Pattern) -> FlowMod {
        FlowMod {
            command: FlowModCmd::DeleteFlow,
            table_id: 0,
            cookie: 0,
            cookie_mask: 0,
            pattern,
            priority: DEFAULT_PRIORITY,
            instructions: vec![],
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: true,
            apply_to_packet: None,
            out_port: None,
            out_group: None,
            check_overlap: false,
        }
    }
}
