//! ECU role assignment from the replies to `0100`

use super::frame::{EcuAddress, Message};
use super::ObdProtocol;
use crate::bits::BitArray;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EcuRole {
    Engine,
    Transmission,
    Unknown,
}

impl fmt::Display for EcuRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EcuRole::Engine => "engine",
            EcuRole::Transmission => "transmission",
            EcuRole::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Responding ECUs and their roles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EcuMap {
    roles: BTreeMap<EcuAddress, EcuRole>,
}

impl EcuMap {
    /// Assign roles to the ECUs that answered the first supported-PID query
    pub fn from_messages(protocol: ObdProtocol, messages: &[Message]) -> Self {
        let mut roles = BTreeMap::new();
        if let [only] = messages {
            roles.insert(only.source, EcuRole::Engine);
            return Self { roles };
        }

        let (engine, transmission) = if protocol.id_bits() == Some(11) {
            (EcuAddress(0x7E8), EcuAddress(0x7E9))
        } else {
            (EcuAddress(0x10), EcuAddress(0x18))
        };
        for message in messages {
            let role = if message.source == engine {
                EcuRole::Engine
            } else if message.source == transmission {
                EcuRole::Transmission
            } else {
                EcuRole::Unknown
            };
            roles.insert(message.source, role);
        }

        if !roles.values().any(|r| *r == EcuRole::Engine) {
            // Skip the mode/PID echo before counting advertised PIDs
            let busiest = messages
                .iter()
                .max_by_key(|m| BitArray::new(m.data.get(2..).unwrap_or(&[])).count_ones());
            if let Some(message) = busiest {
                roles.insert(message.source, EcuRole::Engine);
            }
        }
        Self { roles }
    }

    pub fn role(&self, address: EcuAddress) -> EcuRole {
        self.roles.get(&address).copied().unwrap_or(EcuRole::Unknown)
    }

    pub fn engine(&self) -> Option<EcuAddress> {
        self.roles
            .iter()
            .find(|(_, role)| **role == EcuRole::Engine)
            .map(|(address, _)| *address)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EcuAddress, EcuRole)> + '_ {
        self.roles.iter().map(|(a, r)| (*a, *r))
    }
}
