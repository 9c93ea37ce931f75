//! Subnet host enumeration for the port scan.

use std::net::Ipv4Addr;

/// Upper bound on hosts enumerated from one subnet, whatever the mask.
pub const MAX_SUBNET_HOSTS: usize = 254;

/// An IPv4 subnet seen from one local address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    local: Ipv4Addr,
    network: u32,
    broadcast: u32,
    prefix_len: u8,
}

impl Subnet {
    /// Creates the subnet `local/prefix_len`. Fails for a prefix over 32.
    pub fn new(local: Ipv4Addr, prefix_len: u8) -> Result<Self, String> {
        if prefix_len > 32 {
            return Err(format!("invalid subnet prefix /{}", prefix_len));
        }

        let mask = match prefix_len {
            0 => 0,
            n => u32::MAX << (32 - u32::from(n)),
        };
        let local_bits = u32::from(local);
        let network = local_bits & mask;

        Ok(Self {
            local,
            network,
            broadcast: network | !mask,
            prefix_len,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.broadcast)
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Candidate hosts in ascending order, excluding the network address,
    /// the broadcast address and the local address. At most
    /// [`MAX_SUBNET_HOSTS`] are produced.
    ///
    /// Lazy and restartable: each call starts a fresh iterator.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        // /31 and /32 have no network/broadcast pair to exclude.
        let (first, last) = if self.prefix_len >= 31 {
            (self.network, self.broadcast)
        } else {
            (self.network + 1, self.broadcast - 1)
        };
        let local = u32::from(self.local);

        (first..=last)
            .filter(move |&ip| ip != local)
            .map(Ipv4Addr::from)
            .take(MAX_SUBNET_HOSTS)
    }
}
