//! Packet Classifier
//!
//! Parses the Ethernet frame carried by a packet-in far enough to drive the
//! forwarding decision: addresses, ethertype and the ARP/IPv4 endpoints.

use crate::domain::value_objects::{EtherType, MacAddr};
use pnet::packet::arp::ArpPacket;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use std::net::Ipv4Addr;

/// Protocol-level classification of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Arp { sender_ip: Ipv4Addr, target_ip: Ipv4Addr },
    Ipv4 { src: Ipv4Addr, dst: Ipv4Addr },
    Ipv6,
    /// Any other ethertype, or an ARP/IPv4 frame too short to parse
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedPacket {
    pub eth_src: MacAddr,
    pub eth_dst: MacAddr,
    pub ether_type: EtherType,
    pub kind: PacketKind,
}

pub struct PacketClassifier;

impl PacketClassifier {
    /// Classify a raw Ethernet frame. Returns `None` if it has no complete Ethernet header.
    pub fn classify(frame: &[u8]) -> Option<ClassifiedPacket> {
        let eth = EthernetPacket::new(frame)?;
        let ether_type = eth.get_ethertype();

        let kind = match ether_type {
            EtherTypes::Ipv6 => PacketKind::Ipv6,
            EtherTypes::Arp => ArpPacket::new(eth.payload())
                .map(|arp| PacketKind::Arp {
                    sender_ip: arp.get_sender_proto_addr(),
                    target_ip: arp.get_target_proto_addr(),
                })
                .unwrap_or(PacketKind::Other),
            EtherTypes::Ipv4 => Ipv4Packet::new(eth.payload())
                .map(|ip| PacketKind::Ipv4 {
                    src: ip.get_source(),
                    dst: ip.get_destination(),
                })
                .unwrap_or(PacketKind::Other),
            _ => PacketKind::Other,
        };

        Some(ClassifiedPacket {
            eth_src: eth.get_source(),
            eth_dst: eth.get_destination(),
            ether_type: EtherType(ether_type.0),
            kind,
        })
    }
}

/// Frame builders shared by unit and integration tests.
#[cfg(any(test, feature = "test-util"))]
pub mod frames {
    use crate::domain::value_objects::{EtherType, MacAddr};
    use std::net::Ipv4Addr;

    fn ethernet(dst: MacAddr, src: MacAddr, ether_type: EtherType) -> Vec<u8> {
        let mut frame = Vec::with_capacity(64);
        frame.extend_from_slice(&[dst.0, dst.1, dst.2, dst.3, dst.4, dst.5]);
        frame.extend_from_slice(&[src.0, src.1, src.2, src.3, src.4, src.5]);
        frame.extend_from_slice(&ether_type.0.to_be_bytes());
        frame
    }

    /// ARP request (`dst` broadcast) or reply (`dst` unicast).
    pub fn arp(src: MacAddr, dst: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
        let mut frame = ethernet(dst, src, EtherType::ARP);
        let op: u16 = if dst == MacAddr::broadcast() { 1 } else { 2 };
        frame.extend_from_slice(&1u16.to_be_bytes());
        frame.extend_from_slice(&EtherType::IPV4.0.to_be_bytes());
        frame.push(6);
        frame.push(4);
        frame.extend_from_slice(&op.to_be_bytes());
        frame.extend_from_slice(&[src.0, src.1, src.2, src.3, src.4, src.5]);
        frame.extend_from_slice(&sender_ip.octets());
        if op == 1 {
            frame.extend_from_slice(&[0; 6]);
        } else {
            frame.extend_from_slice(&[dst.0, dst.1, dst.2, dst.3, dst.4, dst.5]);
        }
        frame.extend_from_slice(&target_ip.octets());
        frame
    }

    /// Minimal IPv4 frame with an empty UDP-less payload.
    pub fn ipv4(src: MacAddr, dst: MacAddr, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Vec<u8> {
        let mut frame = ethernet(dst, src, EtherType::IPV4);
        frame.push(0x45);
        frame.push(0);
        frame.extend_from_slice(&20u16.to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0x40, 0]);
        frame.push(64);
        frame.push(17);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&src_ip.octets());
        frame.extend_from_slice(&dst_ip.octets());
        frame
    }

    /// IPv6 frame; only the Ethernet header matters for classification.
    pub fn ipv6(src: MacAddr, dst: MacAddr) -> Vec<u8> {
        let mut frame = ethernet(dst, src, EtherType::IPV6);
        frame.extend_from_slice(&[0x60, 0, 0, 0, 0, 0, 59, 64]);
        frame.extend_from_slice(&[0; 32]);
        frame
    }

    /// Frame with an arbitrary ethertype and no payload.
    pub fn raw(src: MacAddr, dst: MacAddr, ether_type: EtherType) -> Vec<u8> {
        ethernet(dst, src, ether_type)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn h1() -> MacAddr {
        MacAddr::new(0, 0, 0, 0, 0, 1)
    }

    fn h2() -> MacAddr {
        MacAddr::new(0, 0, 0, 0, 0, 2)
    }

    #[test]
    fn test_classify_arp_request() {
        let frame = frames::arp(
            h1(),
            MacAddr::broadcast(),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
        );
        let pkt = PacketClassifier::classify(&frame).unwrap();

        assert_eq!(pkt.eth_src, h1());
        assert_eq!(pkt.eth_dst, MacAddr::broadcast());
        assert_eq!(pkt.ether_type, EtherType::ARP);
        assert_eq!(
            pkt.kind,
            PacketKind::Arp {
                sender_ip: Ipv4Addr::new(10, 0, 0, 1),
                target_ip: Ipv4Addr::new(10, 0, 0, 2),
            }
        );
    }

    #[test]
    fn test_classify_ipv4() {
        let frame = frames::ipv4(h1(), h2(), Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        let pkt = PacketClassifier::classify(&frame).unwrap();

        assert_eq!(pkt.ether_type, EtherType::IPV4);
        assert_eq!(
            pkt.kind,
            PacketKind::Ipv4 {
                src: Ipv4Addr::new(10, 0, 0, 1),
                dst: Ipv4Addr::new(10, 0, 0, 2),
            }
        );
    }

    #[test]
    fn test_classify_ipv6() {
        let pkt = PacketClassifier::classify(&frames::ipv6(h1(), h2())).unwrap();
        assert_eq!(pkt.kind, PacketKind::Ipv6);
        assert_eq!(pkt.ether_type, EtherType::IPV6);
    }

    #[test]
    fn test_classify_other_ethertype() {
        let pkt = PacketClassifier::classify(&frames::raw(h1(), h2(), EtherType(0x88cc))).unwrap();
        assert_eq!(pkt.kind, PacketKind::Other);
        assert_eq!(pkt.ether_type, EtherType(0x88cc));
    }

    #[test]
    fn test_truncated_arp_is_other() {
        let pkt = PacketClassifier::classify(&frames::raw(h1(), h2(), EtherType::ARP)).unwrap();
        assert_eq!(pkt.kind, PacketKind::Other);
    }

    #[test]
    fn test_runt_frame_is_rejected() {
        assert!(PacketClassifier::classify(&[0u8; 10]).is_none());
    }
}
