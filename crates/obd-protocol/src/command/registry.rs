use super::{table, Command, ParameterId};
use crate::error::ObdError;
use crate::mode;
use once_cell::sync::Lazy;
use std::collections::HashMap;

static REGISTRY: Lazy<CommandRegistry> = Lazy::new(|| CommandRegistry::new(table::build()));

/// The process-wide command catalogue
pub fn registry() -> &'static CommandRegistry {
    &REGISTRY
}

/// Immutable command table indexed by (mode, PID) and by name
#[derive(Debug)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    by_key: HashMap<(u8, ParameterId), usize>,
    by_name: HashMap<String, usize>,
}

impl CommandRegistry {
    fn new(commands: Vec<Command>) -> Self {
        let mut by_key = HashMap::with_capacity(commands.len());
        let mut by_name = HashMap::with_capacity(commands.len());
        for (i, cmd) in commands.iter().enumerate() {
            by_key.insert(cmd.key(), i);
            by_name.insert(cmd.name.to_string(), i);
        }
        Self {
            commands,
            by_key,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Exact (mode, PID) lookup
    pub fn get(&self, mode: u8, pid: ParameterId) -> Option<&Command> {
        self.by_key.get(&(mode, pid)).map(|&i| &self.commands[i])
    }

    /// Case-insensitive lookup by display name
    pub fn by_name(&self, name: &str) -> Option<&Command> {
        self.by_name
            .get(name)
            .or_else(|| self.by_name.get(&name.to_ascii_uppercase()))
            .map(|&i| &self.commands[i])
    }

    /// Resolve a user-supplied name or `mode:pid` / `010C` style request
    pub fn resolve(&self, text: &str) -> Result<&Command, ObdError> {
        if let Some(cmd) = self.by_name(text) {
            return Ok(cmd);
        }
        let compact: String = text.chars().filter(|c| *c != ':' && !c.is_whitespace()).collect();
        let parsed = match compact.len() {
            _ if !compact.is_ascii() => None,
            2 => u8::from_str_radix(&compact, 16).ok().map(|m| (m, ParameterId::None)),
            4 => u8::from_str_radix(&compact[..2], 16)
                .ok()
                .zip(u8::from_str_radix(&compact[2..], 16).ok())
                .map(|(m, p)| (m, ParameterId::Byte(p))),
            _ => None,
        };
        parsed
            .and_then(|(m, p)| self.get(m, p))
            .ok_or_else(|| ObdError::UnknownCommand(text.to_string()))
    }

    pub fn by_mode(&self, mode: u8) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(move |c| c.mode == mode)
    }

    /// Commands answering with a supported-PID bitmask, in query order
    pub fn pid_getters(&self) -> Vec<&Command> {
        self.commands
            .iter()
            .filter(|c| c.pid_getter && c.mode != mode::FREEZE_FRAME)
            .collect()
    }

    /// Commands every vehicle is assumed to answer
    pub fn base_commands(&self) -> Vec<&Command> {
        ["PIDS_A", "MIDS_A", "GET_DTC", "CLEAR_DTC", "GET_CURRENT_DTC", "PIDS_9A"]
            .iter()
            .filter_map(|name| self.by_name(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ResponseLength;
    use std::collections::HashSet;

    #[test]
    fn test_keys_and_names_unique() {
        let reg = registry();
        let keys: HashSet<_> = reg.iter().map(|c| c.key()).collect();
        let names: HashSet<_> = reg.iter().map(|c| c.name.clone()).collect();
        assert_eq!(keys.len(), reg.len());
        assert_eq!(names.len(), reg.len());
    }

    #[test]
    fn test_lookup_by_key_and_name() {
        let reg = registry();
        let rpm = reg.get(0x01, ParameterId::Byte(0x0C)).unwrap();
        assert_eq!(rpm.name, "RPM");
        assert_eq!(rpm.response, ResponseLength::Fixed(2));
        assert_eq!(reg.by_name("coolant_temp").unwrap().pid, ParameterId::Byte(0x05));
        assert!(reg.by_name("NOT_A_COMMAND").is_none());
    }

    #[test]
    fn test_freeze_frame_mirrors() {
        let reg = registry();
        let mirror = reg.by_name("DTC_RPM").unwrap();
        assert_eq!(mirror.mode, mode::FREEZE_FRAME);
        assert_eq!(mirror.request(), "020C");
        assert_eq!(reg.by_mode(0x01).count(), reg.by_mode(0x02).count());
    }

    #[test]
    fn test_pid_getters() {
        let names: Vec<_> = registry()
            .pid_getters()
            .iter()
            .map(|c| c.name.to_string())
            .collect();
        for expected in ["PIDS_A", "PIDS_B", "PIDS_C", "PIDS_D", "MIDS_A", "MIDS_F", "PIDS_9A"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert!(!names.iter().any(|n| n.starts_with("DTC_")));
    }

    #[test]
    fn test_resolve() {
        let reg = registry();
        assert_eq!(reg.resolve("010D").unwrap().name, "SPEED");
        assert_eq!(reg.resolve("01:0C").unwrap().name, "RPM");
        assert_eq!(reg.resolve("03").unwrap().name, "GET_DTC");
        assert!(matches!(reg.resolve("01FF"), Err(ObdError::UnknownCommand(_))));
        assert_eq!(reg.base_commands().len(), 6);
    }
}
