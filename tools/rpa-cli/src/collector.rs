//! Movement collector: the command-line's visualizer surface.
//!
//! Tracks the virtual laser head through move, cut, rapid, speed and power
//! commands and keeps one entry per movement. Bed dimensions picked up from
//! memory replies bound the coordinate validation. The collected lines are
//! rendered as a text summary after decode and can be browsed with
//! `--interactive`.

use std::io::{self, BufRead, Write};

use thiserror::Error;

use rpa_decoder::command_handler::HandleCommand;
use rpa_decoder::param::DecodedValue;
use rpa_decoder::protocol::ORIGIN_HOME;

/// Largest relative move expressible in 14 bits, in mm
const MAX_RELATIVE_MM: f64 = (1 << 13) as f64 / 1000.0;

/// Error for the collector's interactive surfaces
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The operator answered a stepping prompt with `quit`
    #[error("exiting at user request")]
    Interrupted,
    /// Prompting failed
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One movement of the virtual head, in mm
#[derive(Debug, Clone)]
pub struct MoveLine {
    /// Command id of the movement, for cross-referencing the decode log
    pub cmd_id: u64,
    /// Decoded command label
    pub label: String,
    /// Start position
    pub from: (f64, f64),
    /// End position
    pub to: (f64, f64),
    /// True when the laser was cutting
    pub cut: bool,
    /// Power in percent at the time of the move
    pub power: f64,
    /// Speed in mm/s at the time of the move
    pub speed: f64,
}

impl MoveLine {
    /// Euclidean length of the movement
    #[must_use]
    pub fn length(&self) -> f64 {
        let dx = self.to.0 - self.from.0;
        let dy = self.to.1 - self.from.1;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Collects movements reported by the decoder
pub struct MoveCollector {
    enabled: bool,
    stepping: bool,
    step_on_command: u64,
    x: f64,
    y: f64,
    origin: (f64, f64),
    power: f64,
    speed: f64,
    bed: (Option<f64>, Option<f64>),
    /// Collected movements, in decode order
    pub lines: Vec<MoveLine>,
}

impl MoveCollector {
    /// Create a collector. A disabled collector ignores every callback.
    #[must_use]
    pub fn new(enabled: bool, stepping: bool, step_on_command: u64) -> Self {
        Self {
            enabled,
            stepping,
            step_on_command,
            x: 0.0,
            y: 0.0,
            origin: (0.0, 0.0),
            power: 0.0,
            speed: 0.0,
            bed: (None, None),
            lines: Vec::new(),
        }
    }

    fn mm(values: &[DecodedValue], index: usize) -> Option<f64> {
        values.get(index)?.as_f64().map(|um| um / 1000.0)
    }

    fn check_coordinate(&self, axis: char, coordinate: f64) {
        if coordinate < 0.0 {
            log::warn!("axis {axis} coordinate {coordinate:.3}mm is less than 0");
            return;
        }
        let limit = if axis == 'X' { self.bed.0 } else { self.bed.1 };
        if let Some(limit) = limit {
            if coordinate > limit {
                log::warn!("axis {axis} coordinate {coordinate:.3}mm is outside the bed");
            }
        }
    }

    fn check_relative(&self, axis: char, relative: f64) {
        if relative.abs() > MAX_RELATIVE_MM {
            log::warn!("axis {axis} relative move {relative:.3}mm exceeds {MAX_RELATIVE_MM}mm");
        }
    }

    fn add_line(&mut self, cmd_id: u64, label: &str, to: (f64, f64), cut: bool) {
        self.check_coordinate('X', to.0);
        self.check_coordinate('Y', to.1);
        self.lines.push(MoveLine {
            cmd_id,
            label: label.to_string(),
            from: (self.x, self.y),
            to,
            cut,
            power: self.power,
            speed: self.speed,
        });
        (self.x, self.y) = to;
    }

    /// Rapid moves measure from the current head position when the
    /// origin-home bit is set, from the stored origin otherwise
    fn rapid_base(&self, option: u64) -> (f64, f64) {
        if option as u8 & ORIGIN_HOME != 0 {
            (self.x, self.y)
        } else {
            self.origin
        }
    }

    fn step_prompt(&self, cmd_id: u64) -> Result<(), CollectorError> {
        if !self.stepping || cmd_id < self.step_on_command {
            return Ok(());
        }
        print!("\nPress Enter (quit to exit): ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if answer.trim() == "quit" {
            return Err(CollectorError::Interrupted);
        }
        Ok(())
    }

    /// Render the collected session as summary lines
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let cuts: Vec<&MoveLine> = self.lines.iter().filter(|line| line.cut).collect();
        let cut_length: f64 = cuts.iter().map(|line| line.length()).sum();
        let travel_length: f64 = self
            .lines
            .iter()
            .filter(|line| !line.cut)
            .map(|line| line.length())
            .sum();

        let mut summary = vec![format!(
            "moves: {} ({} cuts), travel {:.3}mm, cutting {:.3}mm",
            self.lines.len(),
            cuts.len(),
            travel_length,
            cut_length
        )];
        if let Some(bounds) = self.bounds() {
            summary.push(format!(
                "bounds: ({:.3}, {:.3}) to ({:.3}, {:.3})mm",
                bounds.0, bounds.1, bounds.2, bounds.3
            ));
        }
        if let (Some(x), Some(y)) = self.bed {
            summary.push(format!("bed: {x:.3} x {y:.3}mm"));
        }
        summary
    }

    /// Bounding box over all movements as (min x, min y, max x, max y)
    #[must_use]
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self
            .lines
            .iter()
            .flat_map(|line| [line.from, line.to]);
        let first = points.next()?;
        let mut bounds = (first.0, first.1, first.0, first.1);
        for (x, y) in points {
            bounds.0 = bounds.0.min(x);
            bounds.1 = bounds.1.min(y);
            bounds.2 = bounds.2.max(x);
            bounds.3 = bounds.3.max(y);
        }
        Some(bounds)
    }

    /// Small query loop over the collected moves: `stats`, `list [n]`,
    /// `quit`
    pub fn interactive(&self) -> io::Result<()> {
        let stdin = io::stdin();
        loop {
            print!("\nrpa> ");
            io::stdout().flush()?;
            let mut command = String::new();
            if stdin.lock().read_line(&mut command)? == 0 {
                return Ok(());
            }
            let mut words = command.split_whitespace();
            match words.next() {
                Some("stats") => {
                    for line in self.render() {
                        println!("{line}");
                    }
                }
                Some("list") => {
                    let count: usize = words
                        .next()
                        .and_then(|word| word.parse().ok())
                        .unwrap_or(10);
                    for line in self.lines.iter().take(count) {
                        println!(
                            "{}:{} ({:.3}, {:.3}) -> ({:.3}, {:.3}) {} power {:.1}% speed {:.1}mm/S",
                            line.cmd_id,
                            line.label,
                            line.from.0,
                            line.from.1,
                            line.to.0,
                            line.to.1,
                            if line.cut { "cut" } else { "move" },
                            line.power,
                            line.speed
                        );
                    }
                }
                Some("quit" | "exit") => return Ok(()),
                Some(other) => println!("unknown command {other:?} (stats, list [n], quit)"),
                None => {}
            }
        }
    }
}

impl HandleCommand for MoveCollector {
    type Error = CollectorError;

    fn on_command(
        &mut self,
        cmd_id: u64,
        label: &str,
        command: u8,
        sub_command: Option<u8>,
        values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        if !self.enabled {
            return Ok(());
        }
        let mut moved = true;
        match (command, sub_command) {
            (0x88, None) => {
                if let (Some(x), Some(y)) = (Self::mm(values, 0), Self::mm(values, 1)) {
                    self.add_line(cmd_id, label, (x, y), false);
                }
            }
            (0x89, None) => {
                if let (Some(dx), Some(dy)) = (Self::mm(values, 0), Self::mm(values, 1)) {
                    self.check_relative('X', dx);
                    self.check_relative('Y', dy);
                    self.add_line(cmd_id, label, (self.x + dx, self.y + dy), false);
                }
            }
            (0x8A, None) => {
                if let Some(dx) = Self::mm(values, 0) {
                    self.check_relative('X', dx);
                    self.add_line(cmd_id, label, (self.x + dx, self.y), false);
                }
            }
            (0x8B, None) => {
                if let Some(dy) = Self::mm(values, 0) {
                    self.check_relative('Y', dy);
                    self.add_line(cmd_id, label, (self.x, self.y + dy), false);
                }
            }
            (0xA8, None) => {
                if let (Some(x), Some(y)) = (Self::mm(values, 0), Self::mm(values, 1)) {
                    self.add_line(cmd_id, label, (x, y), true);
                }
            }
            (0xA9, None) => {
                if let (Some(dx), Some(dy)) = (Self::mm(values, 0), Self::mm(values, 1)) {
                    self.check_relative('X', dx);
                    self.check_relative('Y', dy);
                    self.add_line(cmd_id, label, (self.x + dx, self.y + dy), true);
                }
            }
            (0xAA, None) => {
                if let Some(dx) = Self::mm(values, 0) {
                    self.check_relative('X', dx);
                    self.add_line(cmd_id, label, (self.x + dx, self.y), true);
                }
            }
            (0xAB, None) => {
                if let Some(dy) = Self::mm(values, 0) {
                    self.check_relative('Y', dy);
                    self.add_line(cmd_id, label, (self.x, self.y + dy), true);
                }
            }
            (0x80, Some(0x00)) => {
                if let Some(x) = Self::mm(values, 0) {
                    self.add_line(cmd_id, label, (x, self.y), false);
                }
            }
            (0x80, Some(0x08)) => {
                if let Some(y) = Self::mm(values, 0) {
                    self.add_line(cmd_id, label, (self.x, y), false);
                }
            }
            (0xD9, Some(sub @ (0x00 | 0x01 | 0x10 | 0x30))) => {
                if let Some(option) = values.first().and_then(DecodedValue::as_u64) {
                    let base = self.rapid_base(option);
                    let target = match sub {
                        0x00 => Self::mm(values, 1).map(|dx| (base.0 + dx, base.1)),
                        0x01 => Self::mm(values, 1).map(|dy| (base.0, base.1 + dy)),
                        _ => match (Self::mm(values, 1), Self::mm(values, 2)) {
                            (Some(dx), Some(dy)) => Some((base.0 + dx, base.1 + dy)),
                            _ => None,
                        },
                    };
                    if let Some(target) = target {
                        self.add_line(cmd_id, label, target, false);
                    }
                }
            }
            (0xC6, Some(0x01 | 0x02)) => {
                if let Some(power) = values.first().and_then(DecodedValue::as_f64) {
                    if !(0.0..=100.0).contains(&power) {
                        log::warn!("power {power:.3}% is out of range");
                    }
                    self.power = power.clamp(0.0, 100.0);
                }
                moved = false;
            }
            (0xC9, Some(0x02 | 0x03 | 0x05 | 0x06)) => {
                if let Some(speed) = values.first().and_then(DecodedValue::as_f64) {
                    self.speed = speed;
                }
                moved = false;
            }
            (0xC9, Some(0x04)) => {
                // Part speed carries the part number first.
                if let Some(speed) = values.get(1).and_then(DecodedValue::as_f64) {
                    self.speed = speed;
                }
                moved = false;
            }
            _ => moved = false,
        }
        if moved {
            self.step_prompt(cmd_id)?;
        }
        Ok(())
    }

    fn on_memory(
        &mut self,
        address_msb: u8,
        address_lsb: u8,
        _label: &str,
        values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        if !self.enabled {
            return Ok(());
        }
        if address_msb == 0x00 {
            match address_lsb {
                0x26 => self.bed.0 = Self::mm(values, 0),
                0x36 => self.bed.1 = Self::mm(values, 0),
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(collector: &mut MoveCollector, cmd_id: u64, command: u8, sub: Option<u8>, values: Vec<DecodedValue>) {
        collector
            .on_command(cmd_id, "TEST", command, sub, &values)
            .unwrap();
    }

    #[test]
    fn tracks_absolute_and_relative_moves() {
        let mut collector = MoveCollector::new(true, false, 0);
        feed(
            &mut collector,
            1,
            0x88,
            None,
            vec![DecodedValue::Int(10_000), DecodedValue::Int(20_000)],
        );
        feed(&mut collector, 2, 0x8A, None, vec![DecodedValue::Int(5_000)]);
        assert_eq!(collector.lines.len(), 2);
        assert_eq!(collector.lines[1].from, (10.0, 20.0));
        assert_eq!(collector.lines[1].to, (15.0, 20.0));
        assert!(!collector.lines[1].cut);
    }

    #[test]
    fn cuts_carry_power_and_speed() {
        let mut collector = MoveCollector::new(true, false, 0);
        feed(
            &mut collector,
            1,
            0xC6,
            Some(0x01),
            vec![DecodedValue::Float(42.5)],
        );
        feed(
            &mut collector,
            2,
            0xC9,
            Some(0x02),
            vec![DecodedValue::Float(120.0)],
        );
        feed(
            &mut collector,
            3,
            0xA8,
            None,
            vec![DecodedValue::Int(1_000), DecodedValue::Int(0)],
        );
        let line = &collector.lines[0];
        assert!(line.cut);
        assert!((line.power - 42.5).abs() < 1e-9);
        assert!((line.speed - 120.0).abs() < 1e-9);
        assert!((line.length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rapid_moves_respect_the_origin_bit() {
        let mut collector = MoveCollector::new(true, false, 0);
        feed(
            &mut collector,
            1,
            0x88,
            None,
            vec![DecodedValue::Int(10_000), DecodedValue::Int(10_000)],
        );
        // ORIGIN_HOME set: relative to the current head position.
        feed(
            &mut collector,
            2,
            0xD9,
            Some(0x10),
            vec![
                DecodedValue::Uint(u64::from(ORIGIN_HOME)),
                DecodedValue::Int(1_000),
                DecodedValue::Int(1_000),
            ],
        );
        assert_eq!(collector.lines[1].to, (11.0, 11.0));
        // Bit clear: relative to the stored origin (0, 0).
        feed(
            &mut collector,
            3,
            0xD9,
            Some(0x10),
            vec![
                DecodedValue::Uint(0),
                DecodedValue::Int(2_000),
                DecodedValue::Int(2_000),
            ],
        );
        assert_eq!(collector.lines[2].to, (2.0, 2.0));
    }

    #[test]
    fn memory_replies_set_the_bed_dimensions() {
        let mut collector = MoveCollector::new(true, false, 0);
        collector
            .on_memory(0x00, 0x26, "Axis Range 1", &[DecodedValue::Int(900_000)])
            .unwrap();
        collector
            .on_memory(0x00, 0x36, "Axis Range 2", &[DecodedValue::Int(600_000)])
            .unwrap();
        assert_eq!(collector.bed, (Some(900.0), Some(600.0)));
        assert!(collector.render().iter().any(|line| line.contains("900.000 x 600.000")));
    }

    #[test]
    fn disabled_collector_ignores_everything() {
        let mut collector = MoveCollector::new(false, false, 0);
        feed(
            &mut collector,
            1,
            0x88,
            None,
            vec![DecodedValue::Int(1), DecodedValue::Int(2)],
        );
        assert!(collector.lines.is_empty());
    }
}
