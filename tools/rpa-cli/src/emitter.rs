//! Console and file emitter for the decode stream.

use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use rpa_decoder::emit::{Channel, Direction, Emit, EmitSignal, MessageHeader};

/// Output behavior frozen from the command line
#[derive(Debug, Default, Clone, Copy)]
pub struct EmitterOptions {
    /// Suppress stdout (the output file is still written)
    pub quiet: bool,
    /// Emit verbose chatter
    pub verbose: bool,
    /// Emit raw capture lines
    pub raw: bool,
    /// Emit deswizzled payload dumps
    pub unswizzled: bool,
    /// Escalate stream errors to shutdown
    pub stop_on_error: bool,
    /// Pause after each raw packet dump
    pub step_packets: bool,
    /// Pause after each decoded message
    pub step_decode: bool,
}

/// Writes the decode stream to the console and an optional output file
pub struct ConsoleEmitter {
    header: MessageHeader,
    out_file: Option<BufWriter<File>>,
    options: EmitterOptions,
}

impl ConsoleEmitter {
    /// Create an emitter, opening the output file if one was requested
    pub fn new(options: EmitterOptions, output_file: Option<&Path>) -> io::Result<Self> {
        let out_file = match output_file {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };
        Ok(Self {
            header: MessageHeader::default(),
            out_file,
            options,
        })
    }

    fn push(&mut self, channel: Channel, message: &str) {
        let line = self.header.line(channel, message);
        self.write(&line);
    }

    /// Flush both sinks; called on every exit path
    pub fn flush(&mut self) {
        let _ = io::stdout().flush();
        if let Some(file) = &mut self.out_file {
            let _ = file.flush();
        }
    }
}

impl Emit for ConsoleEmitter {
    fn write(&mut self, line: &str) {
        if let Some(file) = &mut self.out_file {
            let _ = writeln!(file, "{line}");
        }
        if !self.options.quiet {
            println!("{line}");
        }
    }

    fn verbose(&mut self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            self.push(Channel::Verbose, message);
        }
    }

    fn reader(&mut self, message: &str) {
        self.push(Channel::Reader, message);
    }

    fn parser(&mut self, message: &str) -> Result<(), EmitSignal> {
        self.push(Channel::Parser, message);
        if self.options.step_decode {
            self.pause("Press Enter")?;
        }
        Ok(())
    }

    fn raw(&mut self, message: &str) -> Result<(), EmitSignal> {
        if self.options.raw {
            self.push(Channel::Raw, message);
            if self.options.step_packets {
                self.pause("Press Enter")?;
            }
        }
        Ok(())
    }

    fn unswizzled(&mut self, message: &str) {
        if self.options.unswizzled {
            self.push(Channel::Raw, message);
        }
    }

    fn error(&mut self, message: &str) -> Result<(), EmitSignal> {
        self.push(Channel::Error, message);
        if self.options.stop_on_error {
            Err(EmitSignal::Stopped(message.to_string()))
        } else {
            Ok(())
        }
    }

    fn warn(&mut self, message: &str) {
        self.push(Channel::Warn, message);
    }

    fn info(&mut self, message: &str) {
        self.push(Channel::Info, message);
    }

    fn critical(&mut self, message: &str) -> Result<(), EmitSignal> {
        self.push(Channel::Critical, message);
        if self.options.stop_on_error {
            Err(EmitSignal::Stopped(message.to_string()))
        } else {
            Ok(())
        }
    }

    fn table_error(&mut self, message: &str) {
        self.push(Channel::TableFatal, message);
    }

    fn fatal(&mut self, message: &str) -> EmitSignal {
        self.push(Channel::Fatal, message);
        EmitSignal::Stopped(message.to_string())
    }

    fn pause(&mut self, prompt: &str) -> Result<String, EmitSignal> {
        print!("\n{prompt} (quit to exit): ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return Ok(String::new());
        }
        let answer = answer.trim().to_string();
        if answer == "quit" {
            Err(EmitSignal::Interrupted)
        } else {
            Ok(answer)
        }
    }

    fn set_packet(&mut self, number: u64) {
        self.header.set_packet(number);
    }

    fn set_command(&mut self, number: u64) {
        self.header.set_command(number);
    }

    fn set_direction(&mut self, direction: Direction) {
        self.header.set_direction(direction);
    }
}
