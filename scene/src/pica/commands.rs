//! GPU command stream encoding.
//!
//! A stream is a sequence of 32-bit words. Each command is a parameter word
//! followed by a header word, then any extra parameters, padded so the next
//! command starts on an 8-byte boundary:
//!
//! ```text
//! [param0] [header] [param1 .. paramN] [pad?]
//! header = register | mask << 16 | extra_count << 20 | consecutive << 31
//! ```
//!
//! Streams end with a write of 1 to the command buffer jump register.

/// A GPU register id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PicaRegister(pub u16);

impl PicaRegister {
    pub const TEXUNIT0_BORDER_COLOR: Self = Self(0x081);
    pub const TEXUNIT0_DIM: Self = Self(0x082);
    pub const TEXUNIT0_PARAM: Self = Self(0x083);
    pub const TEXUNIT0_LOD: Self = Self(0x084);
    pub const TEXUNIT0_ADDR1: Self = Self(0x085);
    pub const TEXUNIT0_ADDR2: Self = Self(0x086);
    pub const TEXUNIT0_ADDR3: Self = Self(0x087);
    pub const TEXUNIT0_ADDR4: Self = Self(0x088);
    pub const TEXUNIT0_ADDR5: Self = Self(0x089);
    pub const TEXUNIT0_ADDR6: Self = Self(0x08A);
    pub const TEXUNIT0_SHADOW: Self = Self(0x08B);
    pub const TEXUNIT0_TYPE: Self = Self(0x08E);

    pub const TEXUNIT1_BORDER_COLOR: Self = Self(0x091);
    pub const TEXUNIT1_DIM: Self = Self(0x092);
    pub const TEXUNIT1_PARAM: Self = Self(0x093);
    pub const TEXUNIT1_LOD: Self = Self(0x094);
    pub const TEXUNIT1_ADDR: Self = Self(0x095);
    pub const TEXUNIT1_TYPE: Self = Self(0x096);

    pub const TEXUNIT2_BORDER_COLOR: Self = Self(0x099);
    pub const TEXUNIT2_DIM: Self = Self(0x09A);
    pub const TEXUNIT2_PARAM: Self = Self(0x09B);
    pub const TEXUNIT2_LOD: Self = Self(0x09C);
    pub const TEXUNIT2_ADDR: Self = Self(0x09D);
    pub const TEXUNIT2_TYPE: Self = Self(0x09E);

    pub const CMDBUF_JUMP1: Self = Self(0x23D);

    /// Address registers of texture unit 0, one per cube face.
    pub const TEXUNIT0_FACE_ADDRS: [Self; 6] = [
        Self::TEXUNIT0_ADDR1,
        Self::TEXUNIT0_ADDR2,
        Self::TEXUNIT0_ADDR3,
        Self::TEXUNIT0_ADDR4,
        Self::TEXUNIT0_ADDR5,
        Self::TEXUNIT0_ADDR6,
    ];

    fn offset(self, by: usize) -> Self {
        Self(self.0.wrapping_add(by as u16))
    }
}

/// Value written to [`PicaRegister::CMDBUF_JUMP1`] to terminate a stream.
const END_VALUE: u32 = 1;

const FULL_MASK: u32 = 0xF;

/// Parameters one header can carry: param0 plus an 11-bit extra count.
pub const MAX_PARAMETERS: usize = 0x800;

/// One decoded register write (possibly multi-parameter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub register: PicaRegister,
    pub parameters: Vec<u32>,
    pub mask: u8,
    /// Parameters go to consecutive registers instead of repeating one.
    pub consecutive: bool,
}

impl Command {
    /// First parameter, the value for single-parameter writes.
    pub fn value(&self) -> u32 {
        self.parameters.first().copied().unwrap_or(0)
    }

    /// Value written to `register` by this command, if any.
    pub fn value_for(&self, register: PicaRegister) -> Option<u32> {
        if self.consecutive {
            let delta = register.0.checked_sub(self.register.0)? as usize;
            self.parameters.get(delta).copied()
        } else if register == self.register {
            self.parameters.last().copied()
        } else {
            None
        }
    }

    fn is_end(&self) -> bool {
        self.register == PicaRegister::CMDBUF_JUMP1 && self.value() == END_VALUE
    }
}

// ============================================================================
// Writer
// ============================================================================

#[derive(Debug, Default)]
pub struct CommandWriter {
    words: Vec<u32>,
}

impl CommandWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_command(&mut self, register: PicaRegister, value: u32) {
        self.push(register, &[value], FULL_MASK, false);
    }

    /// Writes several parameters in one command. With `consecutive` set, the
    /// i-th parameter goes to `register + i`.
    pub fn set_commands(&mut self, register: PicaRegister, consecutive: bool, values: &[u32]) {
        if values.is_empty() {
            return;
        }
        self.push(register, values, FULL_MASK, consecutive);
    }

    pub fn write_end(&mut self) {
        self.set_command(PicaRegister::CMDBUF_JUMP1, END_VALUE);
    }

    /// Freezes the stream.
    pub fn get_buffer(self) -> Vec<u32> {
        self.words
    }

    /// Longer writes are split into several commands of at most
    /// [`MAX_PARAMETERS`] each.
    fn push(&mut self, register: PicaRegister, values: &[u32], mask: u32, consecutive: bool) {
        for (index, chunk) in values.chunks(MAX_PARAMETERS).enumerate() {
            let register = if consecutive {
                register.offset(index * MAX_PARAMETERS)
            } else {
                register
            };
            let extra = (chunk.len() - 1) as u32;
            let header = register.0 as u32
                | (mask & 0xF) << 16
                | extra << 20
                | (consecutive as u32) << 31;

            self.words.push(chunk[0]);
            self.words.push(header);
            self.words.extend_from_slice(&chunk[1..]);

            if self.words.len() % 2 != 0 {
                self.words.push(0);
            }
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Lazy cursor over a command stream. Stops at the end sentinel or when the
/// words run out; a truncated trailing command is dropped.
#[derive(Debug)]
pub struct CommandReader<'a> {
    words: &'a [u32],
    index: usize,
    ended: bool,
}

impl<'a> CommandReader<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            index: 0,
            ended: false,
        }
    }

    pub fn has_command(&mut self) -> bool {
        if self.ended {
            return false;
        }
        match self.peek() {
            Some((command, _)) if !command.is_end() => true,
            _ => {
                self.ended = true;
                false
            }
        }
    }

    /// Returns the next command, or None once the stream is over.
    pub fn get_command(&mut self) -> Option<Command> {
        if !self.has_command() {
            return None;
        }
        let (command, next) = self.peek()?;
        self.index = next;
        Some(command)
    }

    fn peek(&self) -> Option<(Command, usize)> {
        let param0 = *self.words.get(self.index)?;
        let header = *self.words.get(self.index + 1)?;

        let extra = ((header >> 20) & 0x7FF) as usize;
        let start = self.index + 2;
        let rest = self.words.get(start..start + extra)?;

        let mut parameters = Vec::with_capacity(extra + 1);
        parameters.push(param0);
        parameters.extend_from_slice(rest);

        let mut next = start + extra;
        if next % 2 != 0 {
            next += 1;
        }

        let command = Command {
            register: PicaRegister((header & 0xFFFF) as u16),
            parameters,
            mask: ((header >> 16) & 0xF) as u8,
            consecutive: header >> 31 != 0,
        };
        Some((command, next))
    }
}

impl Iterator for CommandReader<'_> {
    type Item = Command;

    fn next(&mut self) -> Option<Command> {
        self.get_command()
    }
}

/// Word index of the parameter holding the value written to `register`,
/// taken from the first command that writes it.
pub fn parameter_index(words: &[u32], register: PicaRegister) -> Option<usize> {
    let mut reader = CommandReader::new(words);
    loop {
        let start = reader.index;
        let command = reader.get_command()?;
        let slot = if command.consecutive {
            let delta = register.0.checked_sub(command.register.0).map(usize::from);
            delta.filter(|d| *d < command.parameters.len())
        } else if command.register == register {
            Some(command.parameters.len() - 1)
        } else {
            None
        };

        if let Some(slot) = slot {
            // param0 sits before the header, the rest after it
            return Some(if slot == 0 { start } else { start + 1 + slot });
        }
    }
}

/// Registers touched by consecutive writes, expanded one per parameter.
pub fn expand(command: &Command) -> Vec<(PicaRegister, u32)> {
    if command.consecutive {
        command
            .parameters
            .iter()
            .enumerate()
            .map(|(i, value)| (command.register.offset(i), *value))
            .collect()
    } else {
        command
            .parameters
            .iter()
            .map(|value| (command.register, *value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_command_then_end() {
        let mut writer = CommandWriter::new();
        writer.set_command(PicaRegister::TEXUNIT0_DIM, 0x0040_0080);
        writer.write_end();
        let words = writer.get_buffer();

        let mut reader = CommandReader::new(&words);
        assert!(reader.has_command());
        let command = reader.get_command().unwrap();
        assert_eq!(command.register, PicaRegister::TEXUNIT0_DIM);
        assert_eq!(command.parameters, vec![0x0040_0080]);
        assert!(!reader.has_command());
        assert!(reader.get_command().is_none());
    }

    #[test]
    fn test_long_writes_split_into_commands() {
        let values: Vec<u32> = (0..3000).collect();
        let mut writer = CommandWriter::new();
        writer.set_commands(PicaRegister(0x100), true, &values);
        writer.set_commands(PicaRegister::TEXUNIT0_LOD, false, &values[..MAX_PARAMETERS + 1]);
        writer.write_end();

        let commands: Vec<Command> = CommandReader::new(&writer.get_buffer()).collect();
        let lengths: Vec<usize> = commands.iter().map(|c| c.parameters.len()).collect();
        assert_eq!(lengths, vec![MAX_PARAMETERS, 3000 - MAX_PARAMETERS, MAX_PARAMETERS, 1]);

        assert_eq!(commands[1].register, PicaRegister(0x100 + MAX_PARAMETERS as u16));
        assert_eq!(commands[1].parameters[0], MAX_PARAMETERS as u32);
        assert_eq!(commands[3].register, PicaRegister::TEXUNIT0_LOD);
        assert_eq!(commands[3].value(), MAX_PARAMETERS as u32);
    }

    #[test]
    fn test_words_are_eight_byte_aligned() {
        let mut writer = CommandWriter::new();
        writer.set_commands(PicaRegister::TEXUNIT0_ADDR1, true, &[1, 2]);
        writer.set_command(PicaRegister::TEXUNIT0_TYPE, 3);
        let words = writer.get_buffer();

        // 2 + 1 extra + 1 pad, then 2
        assert_eq!(words.len(), 6);
        assert_eq!(words[1] >> 20 & 0x7FF, 1);
        assert_eq!(words[1] >> 31, 1);
    }

    #[test]
    fn test_unknown_registers_preserved() {
        let mut writer = CommandWriter::new();
        writer.set_command(PicaRegister(0x1FF), 7);
        writer.set_command(PicaRegister::TEXUNIT1_ADDR, 0);
        writer.write_end();
        let words = writer.get_buffer();

        let commands: Vec<Command> = CommandReader::new(&words).collect();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].register, PicaRegister(0x1FF));
        assert_eq!(commands[0].value(), 7);
    }

    #[test]
    fn test_stream_without_end_stops_at_last_word() {
        let mut writer = CommandWriter::new();
        writer.set_command(PicaRegister::TEXUNIT0_LOD, 1);
        let mut words = writer.get_buffer();
        words.push(0xDEAD); // truncated command

        let commands: Vec<Command> = CommandReader::new(&words).collect();
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn test_parameter_index_for_consecutive_write() {
        let mut writer = CommandWriter::new();
        writer.set_command(PicaRegister::TEXUNIT0_DIM, 0);
        writer.set_commands(PicaRegister::TEXUNIT0_ADDR1, true, &[10, 20, 30]);
        writer.write_end();
        let words = writer.get_buffer();

        let first = parameter_index(&words, PicaRegister::TEXUNIT0_ADDR1).unwrap();
        let third = parameter_index(&words, PicaRegister::TEXUNIT0_ADDR3).unwrap();
        assert_eq!(words[first], 10);
        assert_eq!(words[third], 30);
        assert!(parameter_index(&words, PicaRegister::TEXUNIT2_ADDR).is_none());
    }

    #[test]
    fn test_value_for_consecutive_command() {
        let command = Command {
            register: PicaRegister::TEXUNIT0_ADDR1,
            parameters: vec![4, 5, 6],
            mask: 0xF,
            consecutive: true,
        };
        assert_eq!(command.value_for(PicaRegister::TEXUNIT0_ADDR2), Some(5));
        assert_eq!(command.value_for(PicaRegister::TEXUNIT0_ADDR6), None);
        assert_eq!(command.value_for(PicaRegister::TEXUNIT0_DIM), None);
        assert_eq!(expand(&command)[2], (PicaRegister::TEXUNIT0_ADDR3, 6));
    }
}
