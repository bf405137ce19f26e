use crate::error::{Result, SharekeeperError};
use crate::platform::common::WOL_PORT;
use tokio::net::UdpSocket;
use tracing::debug;

/// Parse a MAC address in `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff` form.
pub fn parse_mac(mac: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = mac.split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(SharekeeperError::ConfigInvalid {
            message: format!("Invalid MAC address: {mac}"),
        });
    }

    let mut bytes = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        bytes[i] =
            u8::from_str_radix(part, 16).map_err(|_| SharekeeperError::ConfigInvalid {
                message: format!("Invalid MAC address: {mac}"),
            })?;
    }
    Ok(bytes)
}

/// Magic packet: six 0xFF bytes followed by the MAC repeated 16 times.
pub fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for i in 0..16 {
        packet[6 + i * 6..6 + (i + 1) * 6].copy_from_slice(&mac);
    }
    packet
}

/// Send a Wake-on-LAN magic packet as a link-local broadcast.
pub async fn send_magic_packet(mac: &str) -> Result<()> {
    let mac = parse_mac(mac)?;
    let packet = magic_packet(mac);

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    socket
        .send_to(&packet, ("255.255.255.255", WOL_PORT))
        .await?;

    debug!("Sent Wake-on-LAN packet");
    Ok(())
}
