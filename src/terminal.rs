/// Control bytes the discipline intercepts before they reach the buffer.
const CTRL_C: u8 = 3;
const CTRL_D: u8 = 4;
const BEL: u8 = 7;
const BACKSPACE: u8 = 8;
const DEL: u8 = 127;

/// What the session loop must do in response to fed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalAction {
    /// Write these bytes back to the client (local echo, rubout, bell).
    Echo(Vec<u8>),
    /// A full line was submitted with CR/LF. The buffer has been taken.
    Submit(String),
    /// Ctrl-C: the pending buffer was discarded, redraw the prompt.
    Interrupt,
    /// Ctrl-D: the client is done, close the session.
    EndOfInput,
}

/// Byte-at-a-time line editor for a raw SSH channel.
///
/// The client sends keystrokes, not lines; this accumulates them, echoes
/// printable input back, and handles backspace, Ctrl-C and Ctrl-D the way a
/// cooked tty would. The session loop turns the returned actions into
/// channel writes.
#[derive(Debug, Default)]
pub struct LineDiscipline {
    buffer: Vec<u8>,
    last_was_cr: bool,
}

impl LineDiscipline {
    pub fn new() -> Self {
        LineDiscipline::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Vec<TerminalAction> {
        let mut actions = Vec::new();

        for &byte in data {
            let was_cr = std::mem::replace(&mut self.last_was_cr, false);
            match byte {
                CTRL_D => {
                    actions.push(TerminalAction::EndOfInput);
                    // Anything after an EOF in the same packet is noise
                    break;
                }
                CTRL_C => {
                    self.buffer.clear();
                    actions.push(TerminalAction::Interrupt);
                }
                BACKSPACE | DEL => {
                    if self.buffer.pop().is_some() {
                        // Rub out the echoed character: back, blank, back
                        actions.push(TerminalAction::Echo(vec![BACKSPACE, b' ', BACKSPACE]));
                    } else {
                        actions.push(TerminalAction::Echo(vec![BEL]));
                    }
                }
                b'\r' => {
                    self.last_was_cr = true;
                    actions.push(self.submit());
                }
                b'\n' => {
                    // The LF of a CRLF pair already submitted on the CR
                    if !was_cr {
                        actions.push(self.submit());
                    }
                }
                _ => {
                    self.buffer.push(byte);
                    actions.push(TerminalAction::Echo(vec![byte]));
                }
            }
        }

        actions
    }

    fn submit(&mut self) -> TerminalAction {
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        TerminalAction::Submit(line)
    }
}
