use std::ops::{Add, Sub};

/// A point in the root-window coordinate space.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Point {
    /// horizontal coordinate
    pub x: i32,
    /// vertical coordinate
    pub y: i32,
}

impl Point {
    /// Constrain this point into the given rectangle.
    pub fn constrain(self, rect: Rectangle) -> Point {
        Point {
            x: self.x.max(rect.x).min(rect.x + rect.w.max(1) - 1),
            y: self.y.max(rect.y).min(rect.y + rect.h.max(1) - 1),
        }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Point {
        Point { x, y }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, other: Point) -> Point {
        Point {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, other: Point) -> Point {
        Point {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

/// An axis-aligned rectangle in the root-window coordinate space.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Rectangle {
    /// horizontal position
    pub x: i32,
    /// vertical position
    pub y: i32,
    /// width
    pub w: i32,
    /// height
    pub h: i32,
}

impl Rectangle {
    /// Create a rectangle from position and size
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Rectangle {
        Rectangle { x, y, w, h }
    }

    /// Whether this rectangle has zero visible area
    pub fn is_empty(self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Whether the given point lies inside this rectangle
    pub fn contains(self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.w
            && point.y >= self.y
            && point.y < self.y + self.h
    }
}
