//! `paths`
//!
//! Vector paths the laser head traces, and the nearest-neighbour reordering
//! that cuts down on pen-up travel between them.

/// A point in device pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    /// Horizontal axis position.
    pub x: i64,
    /// Vertical axis position.
    pub y: i64,
}

impl From<(i64, i64)> for Point {
    fn from((x, y): (i64, i64)) -> Self {
        Point { x, y }
    }
}

impl Point {
    /// Squared distance between two points. Orders the same as the
    /// Euclidean distance without the rounding.
    ///
    /// # Arguments
    /// * `other`: The point to measure to.
    ///
    /// # Returns
    /// The squared distance.
    pub fn distance_squared(self, other: Point) -> i128 {
        let dx = i128::from(self.x) - i128::from(other.x);
        let dy = i128::from(self.y) - i128::from(other.y);
        dx * dx + dy * dy
    }

    /// Euclidean distance between two points.
    ///
    /// # Arguments
    /// * `other`: The point to measure to.
    ///
    /// # Returns
    /// The distance in device pixels.
    #[allow(clippy::cast_precision_loss)]
    pub fn distance(self, other: Point) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }
}

/// Identifies a [`Vector`] within the [`VectorList`] it was appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VectorId(u64);

/// A contiguous path traced with the pen down, at one power.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    /// Set when the vector joins a list.
    id: VectorId,
    /// Start, intermediate and end points, in order. Never empty.
    points: Vec<Point>,
    /// The cutting pass, paths of one pass share a power.
    pass: usize,
    /// Power as a percentage of the vector power.
    power: i32,
    /// Vector speed.
    speed: i32,
}

impl Vector {
    /// Creates a new [`Vector`] starting at a point.
    ///
    /// # Arguments
    /// * `start`: The first point of the path.
    /// * `pass`: The cutting pass the path belongs to.
    /// * `power`: Power as a percentage of the vector power.
    /// * `speed`: Vector speed.
    ///
    /// # Returns
    /// A path holding only its start point.
    pub fn new(start: Point, pass: usize, power: i32, speed: i32) -> Self {
        Vector {
            id: VectorId(0),
            points: vec![start],
            pass,
            power,
            speed,
        }
    }

    /// Extends the path to a point.
    ///
    /// # Arguments
    /// * `point`: The next point of the path.
    pub fn line_to(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Gets the identity of this path within its list.
    pub fn id(&self) -> VectorId {
        self.id
    }

    /// Gets the first point.
    pub fn start(&self) -> Point {
        self.points[0]
    }

    /// Gets the last point.
    pub fn end(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    /// Gets every point of the path, in order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Gets the number of line segments in the path.
    pub fn segments(&self) -> usize {
        self.points.len() - 1
    }

    /// Gets the cutting pass.
    pub fn pass(&self) -> usize {
        self.pass
    }

    /// Gets the power, as a percentage of the vector power.
    pub fn power(&self) -> i32 {
        self.power
    }

    /// Gets the vector speed.
    pub fn speed(&self) -> i32 {
        self.speed
    }

    /// Gets the length of the path.
    ///
    /// # Returns
    /// Total length of all segments, in device pixels.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|segment| segment[0].distance(segment[1]))
            .sum()
    }

    /// Swaps the start and end of the path.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// How close either end of the path is to a point.
    fn closest_end(&self, point: Point) -> i128 {
        self.start()
            .distance_squared(point)
            .min(self.end().distance_squared(point))
    }
}

/// An ordered collection of [`Vector`]s with running statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorList {
    /// The paths, in cutting order.
    vectors: Vec<Vector>,
    /// Identity handed to the next appended path.
    next_id: u64,
    /// Total length of all paths.
    length: f64,
    /// Pass of the most recently appended path.
    pass: usize,
    /// Power of the most recently appended path.
    power: i32,
    /// Speed of the most recently appended path.
    speed: i32,
}

impl VectorList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a path to the end of the list.
    ///
    /// # Arguments
    /// * `vector`: The path to add.
    ///
    /// # Returns
    /// The identity the path now has in this list.
    pub fn append(&mut self, mut vector: Vector) -> VectorId {
        vector.id = VectorId(self.next_id);
        self.next_id += 1;
        let id = vector.id;
        self.push(vector);
        id
    }

    /// Adds a path that already has an identity.
    fn push(&mut self, vector: Vector) {
        self.length += vector.length();
        self.pass = vector.pass;
        self.power = vector.power;
        self.speed = vector.speed;
        self.vectors.push(vector);
    }

    /// Takes a path out of the list.
    ///
    /// # Arguments
    /// * `id`: The path to remove.
    ///
    /// # Returns
    /// The path, if it was in the list.
    pub fn remove(&mut self, id: VectorId) -> Option<Vector> {
        let index = self.vectors.iter().position(|vector| vector.id == id)?;
        let vector = self.vectors.remove(index);
        self.length -= vector.length();
        Some(vector)
    }

    /// Checks whether a path is in the list.
    pub fn contains(&self, id: VectorId) -> bool {
        self.vectors.iter().any(|vector| vector.id == id)
    }

    /// Gets the number of paths.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Checks whether there are no paths.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Gets the total length of all paths, in device pixels.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the pass, power and speed of the most recently appended path.
    pub fn current(&self) -> (usize, i32, i32) {
        (self.pass, self.power, self.speed)
    }

    /// Iterates over the paths in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Vector> {
        self.vectors.iter()
    }

    /// Recomputes the cached statistics from the paths.
    pub fn recompute_stats(&mut self) {
        self.length = self.vectors.iter().map(Vector::length).sum();
        if let Some(last) = self.vectors.last() {
            self.pass = last.pass;
            self.power = last.power;
            self.speed = last.speed;
        }
    }

    /// Finds the path with an end nearest to a point. Ties go to the path
    /// that comes first in the list.
    ///
    /// # Arguments
    /// * `point`: Where the head is.
    ///
    /// # Returns
    /// The nearest path, or `None` if the list is empty.
    pub fn find_closest(&self, point: Point) -> Option<&Vector> {
        let mut closest: Option<(&Vector, i128)> = None;
        for vector in &self.vectors {
            let distance = vector.closest_end(point);
            if closest.map_or(true, |(_, best)| distance < best) {
                closest = Some((vector, distance));
            }
        }
        closest.map(|(vector, _)| vector)
    }

    /// Reorders the paths to cut down on travel between them.
    ///
    /// The first path is kept as the seed. From the end of each path the
    /// nearest remaining path is taken next, reversed if its far end is the
    /// closer one.
    ///
    /// # Returns
    /// A list with the same paths, possibly reversed, in their new order.
    #[must_use]
    pub fn optimize(mut self) -> VectorList {
        let mut optimized = VectorList {
            next_id: self.next_id,
            ..VectorList::default()
        };

        let Some(seed) = self.vectors.first().map(Vector::id) else {
            return optimized;
        };
        let Some(seed) = self.remove(seed) else {
            return optimized;
        };
        let mut head = seed.end();
        optimized.push(seed);

        while let Some(id) = self.find_closest(head).map(Vector::id) {
            let Some(mut vector) = self.remove(id) else {
                break;
            };
            if vector.end().distance_squared(head) < vector.start().distance_squared(head) {
                vector.reverse();
            }
            head = vector.end();
            optimized.push(vector);
        }

        optimized.recompute_stats();
        optimized
    }

    /// Optimizes each cutting pass on its own, keeping the passes in the
    /// order they first appear.
    ///
    /// # Returns
    /// A list with the same paths, grouped by pass.
    #[must_use]
    pub fn optimize_passes(self) -> VectorList {
        let next_id = self.next_id;
        let mut passes: Vec<VectorList> = vec![];
        for vector in self.vectors {
            match passes.iter_mut().find(|list| list.pass == vector.pass) {
                Some(list) => list.push(vector),
                None => {
                    let mut list = VectorList::new();
                    list.push(vector);
                    passes.push(list);
                }
            }
        }

        let mut optimized = VectorList {
            next_id,
            ..VectorList::default()
        };
        for pass in passes {
            for vector in pass.optimize().vectors {
                optimized.push(vector);
            }
        }
        optimized.recompute_stats();
        optimized
    }

    /// Total distance travelled with the pen up when cutting in this order,
    /// starting from the first path.
    ///
    /// # Returns
    /// The travel in device pixels.
    pub fn travel(&self) -> f64 {
        self.vectors
            .windows(2)
            .map(|pair| pair[0].end().distance(pair[1].start()))
            .sum()
    }
}

impl<'a> IntoIterator for &'a VectorList {
    type Item = &'a Vector;
    type IntoIter = std::slice::Iter<'a, Vector>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
