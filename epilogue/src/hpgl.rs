//! `hpgl`
//!
//! Turns the vector stream into the HP-GL/2 subset the engraver cuts with.

use std::io::{BufRead, Write};

use log::debug;

use crate::{
    bed::Placement,
    commands::{read_commands, VectorCommand},
    paths::{Point, Vector, VectorList},
    pcl::ESC,
    EncodeError, JobConfig,
};

/// Power the head starts each tile at, as a percentage of the vector power.
const FULL_POWER: i32 = 100;

/// A summary of what was cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorStats {
    /// Paths in one copy of the design.
    pub paths: usize,
    /// Line segments in one copy of the design.
    pub segments: usize,
    /// Copies cut.
    pub tiles: usize,
}

/// Builds the paths described by a vector stream.
///
/// Every power change ends the current path, so each path is cut at a single
/// power. Passes are numbered by the order their power first appears.
///
/// # Arguments
/// * `config`: The (clamped) job settings.
/// * `commands`: The parsed vector stream.
///
/// # Returns
/// The paths in stream order.
pub fn build_vectors(config: &JobConfig, commands: &[VectorCommand]) -> VectorList {
    let mut builder = PathBuilder {
        speed: config.vector_speed,
        ..PathBuilder::default()
    };

    for command in commands {
        match *command {
            VectorCommand::Move { x, y } => builder.move_to(Point { x, y }),
            VectorCommand::LineTo { x, y } => builder.line_to(Point { x, y }),
            VectorCommand::ClosePath => builder.close(),
            VectorCommand::SetPower(power) => builder.set_power(power),
            VectorCommand::EndOfStream => break,
        }
    }

    builder.finish();
    builder.list
}

/// Tracks the pen while paths are built from the stream.
struct PathBuilder {
    /// Completed paths.
    list: VectorList,
    /// The path being drawn, if the pen is down.
    current: Option<Vector>,
    /// Start of the current sub-path.
    start: Point,
    /// Where the last line ended.
    last: Point,
    /// Set by a move, cleared by the first line after it.
    new_subpath: bool,
    /// Current power, percent of the vector power.
    power: i32,
    /// Vector speed for every path.
    speed: i32,
    /// Powers in the order they first appeared, indexed by pass.
    passes: Vec<i32>,
}

impl Default for PathBuilder {
    fn default() -> Self {
        PathBuilder {
            list: VectorList::new(),
            current: None,
            start: Point::default(),
            last: Point::default(),
            new_subpath: true,
            power: FULL_POWER,
            speed: 100,
            passes: vec![],
        }
    }
}

impl PathBuilder {
    /// Gets the pass for a power, adding a new pass if needed.
    fn pass_for(&mut self, power: i32) -> usize {
        if let Some(pass) = self.passes.iter().position(|known| *known == power) {
            pass
        } else {
            self.passes.push(power);
            self.passes.len() - 1
        }
    }

    /// Lifts the pen, keeping the path drawn so far.
    fn finish(&mut self) {
        if let Some(vector) = self.current.take() {
            self.list.append(vector);
        }
    }

    /// Handles `M`.
    fn move_to(&mut self, point: Point) {
        self.finish();
        self.start = point;
        self.new_subpath = true;
    }

    /// Handles `L`.
    fn line_to(&mut self, point: Point) {
        if self.current.is_none() {
            // after a power change the pen carries on from where it stopped
            let from = if self.new_subpath { self.start } else { self.last };
            let pass = self.pass_for(self.power);
            self.current = Some(Vector::new(from, pass, self.power, self.speed));
        }
        if let Some(vector) = self.current.as_mut() {
            vector.line_to(point);
        }
        self.last = point;
        self.new_subpath = false;
    }

    /// Handles `C`. Only closes a sub-path that is being drawn and is still open.
    fn close(&mut self) {
        if !self.new_subpath && self.current.is_some() && self.last != self.start {
            self.line_to(self.start);
        }
    }

    /// Handles `P`.
    fn set_power(&mut self, power: i32) {
        if power != self.power {
            self.finish();
            self.power = power;
        }
    }
}

/// Writes HP-GL/2 for paths, tracking the pen and power of the head.
struct Plotter<'a, W> {
    /// The job settings.
    config: &'a JobConfig,
    /// Where the tiles go.
    placement: &'a Placement,
    /// Where to write the HP-GL/2.
    out: &'a mut W,
    /// Whether a `PD` instruction is still open.
    pen_down: bool,
    /// Current power, percent of the vector power.
    power: i32,
    /// Whether any tile was cut.
    drawn: bool,
}

impl<W: Write> Plotter<'_, W> {
    /// Cuts one copy of the design.
    ///
    /// # Arguments
    /// * `vectors`: The paths, in cutting order.
    /// * `offset`: Offset of this copy.
    fn tile(&mut self, vectors: &VectorList, offset: (i64, i64)) -> Result<(), EncodeError> {
        if vectors.is_empty() {
            return Ok(());
        }

        let config = self.config;
        write!(
            self.out,
            "IN;XR{:04};YP{:03};ZS{:03};",
            config.vector_frequency, config.vector_power, config.vector_speed
        )?;
        self.power = FULL_POWER;
        self.drawn = true;

        for vector in vectors {
            if vector.power() != self.power {
                self.set_power(vector.power())?;
            }
            self.trace(vector, offset)?;
        }
        self.lift()?;
        Ok(())
    }

    /// Terminates an open `PD` instruction.
    fn lift(&mut self) -> Result<(), EncodeError> {
        if self.pen_down {
            self.out.write_all(b";")?;
            self.pen_down = false;
        }
        Ok(())
    }

    /// Changes power with the pen up.
    ///
    /// When running below full speed, speed and frequency are scaled along
    /// with power so the energy delivered per unit length stays consistent.
    fn set_power(&mut self, power: i32) -> Result<(), EncodeError> {
        if self.pen_down {
            self.lift()?;
            self.out.write_all(b"PU;")?;
        }
        self.power = power;

        let config = self.config;
        let mut epower = (power * config.vector_power + 50) / 100;
        if config.vector_speed < 100 {
            let mut espeed = config.vector_speed;
            let mut efreq = config.vector_frequency;
            if epower > 0 && power < 100 {
                let ratio = (10_000 / power)
                    .min(10_000 / espeed)
                    .min(500_000 / efreq);
                epower = (50 + epower * ratio) / 100;
                espeed = (50 + espeed * ratio) / 100;
                efreq = (50 + efreq * ratio) / 100;
            }
            write!(self.out, "ZS{espeed:03};XR{efreq:04};")?;
        }
        write!(self.out, "YP{epower:03};")?;
        Ok(())
    }

    /// Moves to the start of a path and cuts it.
    fn trace(&mut self, vector: &Vector, offset: (i64, i64)) -> Result<(), EncodeError> {
        self.lift()?;

        let start = self.device(vector.start(), offset);
        write!(self.out, "PU{},{};PD", start.x, start.y)?;
        for (index, point) in vector.points()[1..].iter().enumerate() {
            let point = self.device(*point, offset);
            if index > 0 {
                self.out.write_all(b",")?;
            }
            write!(self.out, "{},{}", point.x, point.y)?;
        }
        self.pen_down = true;
        Ok(())
    }

    /// Converts a point of the design to bed coordinates.
    fn device(&self, point: Point, (off_x, off_y): (i64, i64)) -> Point {
        let x = if self.config.flip {
            self.placement.page_width - point.x
        } else {
            point.x
        };
        Point {
            x: self.placement.base_x + off_x + x,
            y: self.placement.base_y + off_y + point.y,
        }
    }
}

/// Writes the HP-GL/2 for a set of paths, once per tile.
///
/// # Arguments
/// * `config`: The (clamped) job settings.
/// * `placement`: Where the tiles go.
/// * `vectors`: The paths, in cutting order.
/// * `out`: Where to write the HP-GL/2.
///
/// # Returns
/// The number of tiles cut.
///
/// # Errors
/// [`EncodeError::Io`] if the output cannot be written.
pub fn encode_vectors<W: Write>(
    config: &JobConfig,
    placement: &Placement,
    vectors: &VectorList,
    out: &mut W,
) -> Result<usize, EncodeError> {
    let mut plotter = Plotter {
        config,
        placement,
        out,
        pen_down: false,
        power: FULL_POWER,
        drawn: false,
    };

    let mut tiles = 0;
    for off_y in placement.y_offsets() {
        for off_x in placement.x_offsets() {
            plotter.tile(vectors, (off_x, off_y))?;
            tiles += 1;
        }
    }

    if plotter.drawn {
        // Leave vector mode, pen up.
        write!(plotter.out, "{ESC}%0B{ESC}%1BPU")?;
    } else {
        tiles = 0;
    }

    Ok(tiles)
}

/// Reads the vector stream and writes the vector block for a job.
///
/// The stream is read once and replayed for every tile.
///
/// # Arguments
/// * `config`: The (clamped) job settings.
/// * `placement`: Where the tiles go.
/// * `reader`: The vector stream.
/// * `out`: Where to write the HP-GL/2.
///
/// # Returns
/// What was cut.
///
/// # Errors
/// [`EncodeError::Vectors`] if the stream cannot be read, [`EncodeError::Io`] if the
/// output cannot be written.
pub fn generate_vector<R: BufRead, W: Write>(
    config: &JobConfig,
    placement: &Placement,
    reader: R,
    out: &mut W,
) -> Result<VectorStats, EncodeError> {
    let commands = read_commands(reader)?;
    let mut vectors = build_vectors(config, &commands);
    debug!(
        "{} commands, {} paths, {:.0} pixels of travel",
        commands.len(),
        vectors.len(),
        vectors.travel()
    );

    if config.optimize_vectors {
        vectors = vectors.optimize_passes();
        debug!("optimized to {:.0} pixels of travel", vectors.travel());
    }

    let tiles = encode_vectors(config, placement, &vectors, out)?;
    Ok(VectorStats {
        paths: vectors.len(),
        segments: vectors.iter().map(Vector::segments).sum(),
        tiles,
    })
}
