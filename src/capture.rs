//! Packet-capture summarizer.
//!
//! Parses classic pcap and pcapng containers directly (both endiannesses,
//! nanosecond pcap variants included) and decodes Ethernet → IPv4/IPv6 →
//! TCP/UDP far enough to aggregate protocol counts, unique addresses, and
//! destination ports. Raw packet payloads are never emitted; the output is
//! a single synthetic text document suitable for chunking and embedding.
//!
//! Analysis stops at a configurable packet cap; packets beyond the cap are
//! still counted toward the reported total. A truncated trailing record
//! ends parsing cleanly with whatever was read.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::ExtractError;

const PCAP_MAGIC_US: u32 = 0xa1b2_c3d4;
const PCAP_MAGIC_NS: u32 = 0xa1b2_3c4d;
const PCAPNG_SECTION_HEADER: u32 = 0x0a0d_0d0a;
const PCAPNG_BYTE_ORDER: u32 = 0x1a2b_3c4d;
const PCAPNG_INTERFACE_BLOCK: u32 = 0x0000_0001;
const PCAPNG_SIMPLE_PACKET: u32 = 0x0000_0003;
const PCAPNG_ENHANCED_PACKET: u32 = 0x0000_0006;

const LINKTYPE_ETHERNET: u32 = 1;
const LINKTYPE_RAW_IPV4: u32 = 228;
const LINKTYPE_RAW: u32 = 101;

/// Aggregates extracted from a capture file.
#[derive(Debug, Clone)]
pub struct CaptureSummary {
    pub file_name: String,
    /// Every record in the file, including those past the analysis cap.
    pub total_packets: usize,
    /// Records actually decoded.
    pub analyzed_packets: usize,
    pub protocols: BTreeMap<String, usize>,
    pub addresses: BTreeSet<IpAddr>,
    pub dest_ports: BTreeSet<u16>,
}

impl CaptureSummary {
    fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            total_packets: 0,
            analyzed_packets: 0,
            protocols: BTreeMap::new(),
            addresses: BTreeSet::new(),
            dest_ports: BTreeSet::new(),
        }
    }

    /// Render the aggregates as the synthetic document text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Packet Capture Analysis: {}\n", self.file_name));
        out.push_str(&format!("Total packets: {}\n", self.total_packets));
        out.push_str(&format!("Analyzed packets: {}\n", self.analyzed_packets));

        out.push_str("\nProtocol distribution:\n");
        let mut by_count: Vec<(&String, &usize)> = self.protocols.iter().collect();
        by_count.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (proto, count) in by_count {
            out.push_str(&format!("  - {}: {} packets\n", proto, count));
        }

        out.push_str(&format!("\nUnique addresses: {}\n", self.addresses.len()));
        let sample_addrs: Vec<String> = self
            .addresses
            .iter()
            .take(10)
            .map(|a| a.to_string())
            .collect();
        if !sample_addrs.is_empty() {
            out.push_str(&format!("Sample addresses: {}\n", sample_addrs.join(", ")));
        }

        out.push_str(&format!(
            "\nUnique destination ports: {}\n",
            self.dest_ports.len()
        ));
        let sample_ports: Vec<String> = self
            .dest_ports
            .iter()
            .take(20)
            .map(|p| p.to_string())
            .collect();
        if !sample_ports.is_empty() {
            out.push_str(&format!("Sample ports: {}\n", sample_ports.join(", ")));
        }

        out
    }

    fn count_protocol(&mut self, name: &str) {
        *self.protocols.entry(name.to_string()).or_insert(0) += 1;
    }
}

/// Parse a capture file and aggregate up to `max_analyzed` packets.
pub fn summarize_capture(
    file_name: &str,
    bytes: &[u8],
    max_analyzed: usize,
) -> Result<CaptureSummary, ExtractError> {
    if bytes.len() < 4 {
        return Err(ExtractError::NoPacketsFound);
    }

    let mut summary = CaptureSummary::new(file_name);

    let magic_le = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic_be = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    if magic_le == PCAPNG_SECTION_HEADER || magic_be == PCAPNG_SECTION_HEADER {
        parse_pcapng(bytes, max_analyzed, &mut summary)?;
    } else if magic_le == PCAP_MAGIC_US || magic_le == PCAP_MAGIC_NS {
        parse_classic(bytes, true, max_analyzed, &mut summary)?;
    } else if magic_be == PCAP_MAGIC_US || magic_be == PCAP_MAGIC_NS {
        parse_classic(bytes, false, max_analyzed, &mut summary)?;
    } else {
        return Err(ExtractError::UnsupportedOrCorrupt(
            "not a pcap or pcapng file".to_string(),
        ));
    }

    if summary.total_packets == 0 {
        return Err(ExtractError::NoPacketsFound);
    }
    Ok(summary)
}

fn read_u32(bytes: &[u8], offset: usize, little_endian: bool) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    let arr = [b[0], b[1], b[2], b[3]];
    Some(if little_endian {
        u32::from_le_bytes(arr)
    } else {
        u32::from_be_bytes(arr)
    })
}

// ============ Classic pcap ============

fn parse_classic(
    bytes: &[u8],
    little_endian: bool,
    max_analyzed: usize,
    summary: &mut CaptureSummary,
) -> Result<(), ExtractError> {
    if bytes.len() < 24 {
        return Err(ExtractError::NoPacketsFound);
    }
    let linktype = read_u32(bytes, 20, little_endian).unwrap_or(LINKTYPE_ETHERNET);

    let mut offset = 24usize;
    loop {
        // 16-byte record header: ts_sec, ts_frac, captured_len, original_len.
        let Some(captured_len) = read_u32(bytes, offset + 8, little_endian) else {
            break;
        };
        let captured_len = captured_len as usize;
        let data_start = offset + 16;
        let data_end = data_start + captured_len;
        if data_end > bytes.len() {
            // Truncated trailing record.
            break;
        }

        summary.total_packets += 1;
        if summary.analyzed_packets < max_analyzed {
            summary.analyzed_packets += 1;
            analyze_frame(&bytes[data_start..data_end], linktype, summary);
        }
        offset = data_end;
        if offset >= bytes.len() {
            break;
        }
    }
    Ok(())
}

// ============ pcapng ============

fn parse_pcapng(
    bytes: &[u8],
    max_analyzed: usize,
    summary: &mut CaptureSummary,
) -> Result<(), ExtractError> {
    // Endianness comes from the section header's byte-order magic.
    let bom = read_u32(bytes, 8, true).ok_or(ExtractError::NoPacketsFound)?;
    let little_endian = bom == PCAPNG_BYTE_ORDER;
    if !little_endian && read_u32(bytes, 8, false) != Some(PCAPNG_BYTE_ORDER) {
        return Err(ExtractError::UnsupportedOrCorrupt(
            "pcapng: bad byte-order magic".to_string(),
        ));
    }

    let mut linktype = LINKTYPE_ETHERNET;
    let mut offset = 0usize;

    while offset + 12 <= bytes.len() {
        let Some(block_type) = read_u32(bytes, offset, little_endian) else {
            break;
        };
        let Some(block_len) = read_u32(bytes, offset + 4, little_endian) else {
            break;
        };
        let block_len = block_len as usize;
        if block_len < 12 || block_len % 4 != 0 || offset + block_len > bytes.len() {
            break;
        }
        let body = &bytes[offset + 8..offset + block_len - 4];

        match block_type {
            PCAPNG_INTERFACE_BLOCK => {
                if body.len() >= 2 {
                    linktype = if little_endian {
                        u16::from_le_bytes([body[0], body[1]]) as u32
                    } else {
                        u16::from_be_bytes([body[0], body[1]]) as u32
                    };
                }
            }
            PCAPNG_ENHANCED_PACKET => {
                if body.len() >= 20 {
                    let captured_len = read_u32(body, 12, little_endian).unwrap_or(0) as usize;
                    let data = body.get(20..20 + captured_len.min(body.len() - 20));
                    summary.total_packets += 1;
                    if let Some(data) = data {
                        if summary.analyzed_packets < max_analyzed {
                            summary.analyzed_packets += 1;
                            analyze_frame(data, linktype, summary);
                        }
                    }
                }
            }
            PCAPNG_SIMPLE_PACKET => {
                if body.len() >= 4 {
                    summary.total_packets += 1;
                    if summary.analyzed_packets < max_analyzed {
                        summary.analyzed_packets += 1;
                        analyze_frame(&body[4..], linktype, summary);
                    }
                }
            }
            _ => {}
        }

        offset += block_len;
    }
    Ok(())
}

// ============ Frame decoding ============

fn analyze_frame(data: &[u8], linktype: u32, summary: &mut CaptureSummary) {
    match linktype {
        LINKTYPE_ETHERNET => analyze_ethernet(data, summary),
        LINKTYPE_RAW | LINKTYPE_RAW_IPV4 => analyze_ip(data, summary),
        _ => summary.count_protocol("other"),
    }
}

fn analyze_ethernet(data: &[u8], summary: &mut CaptureSummary) {
    if data.len() < 14 {
        summary.count_protocol("other");
        return;
    }
    let mut ethertype = u16::from_be_bytes([data[12], data[13]]);
    let mut payload = &data[14..];

    // Skip one 802.1Q VLAN tag if present.
    if ethertype == 0x8100 && payload.len() >= 4 {
        ethertype = u16::from_be_bytes([payload[2], payload[3]]);
        payload = &payload[4..];
    }

    match ethertype {
        0x0800 | 0x86dd => analyze_ip(payload, summary),
        0x0806 => summary.count_protocol("arp"),
        _ => summary.count_protocol("other"),
    }
}

fn analyze_ip(data: &[u8], summary: &mut CaptureSummary) {
    match data.first().map(|b| b >> 4) {
        Some(4) => analyze_ipv4(data, summary),
        Some(6) => analyze_ipv6(data, summary),
        _ => summary.count_protocol("other"),
    }
}

fn analyze_ipv4(data: &[u8], summary: &mut CaptureSummary) {
    if data.len() < 20 {
        summary.count_protocol("other");
        return;
    }
    let header_len = ((data[0] & 0x0f) as usize) * 4;
    if header_len < 20 || data.len() < header_len {
        summary.count_protocol("other");
        return;
    }

    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    summary.addresses.insert(IpAddr::V4(src));
    summary.addresses.insert(IpAddr::V4(dst));

    let protocol = data[9];
    summary.count_protocol(protocol_name(protocol));
    record_transport(protocol, &data[header_len..], summary);
}

fn analyze_ipv6(data: &[u8], summary: &mut CaptureSummary) {
    if data.len() < 40 {
        summary.count_protocol("other");
        return;
    }
    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&data[8..24]);
    dst.copy_from_slice(&data[24..40]);
    summary.addresses.insert(IpAddr::V6(Ipv6Addr::from(src)));
    summary.addresses.insert(IpAddr::V6(Ipv6Addr::from(dst)));

    let next_header = data[6];
    summary.count_protocol(protocol_name(next_header));
    record_transport(next_header, &data[40..], summary);
}

fn record_transport(protocol: u8, payload: &[u8], summary: &mut CaptureSummary) {
    // TCP and UDP both start with source port, destination port.
    if (protocol == 6 || protocol == 17) && payload.len() >= 4 {
        let dport = u16::from_be_bytes([payload[2], payload[3]]);
        summary.dest_ports.insert(dport);
    }
}

fn protocol_name(protocol: u8) -> &'static str {
    match protocol {
        1 => "icmp",
        2 => "igmp",
        6 => "tcp",
        17 => "udp",
        58 => "icmpv6",
        _ => "other",
    }
}
