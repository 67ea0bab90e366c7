use std::collections::BTreeMap;

/// A sparse mapping from axis name to real value. Binary operations only
/// consider axes present on the receiver; see the individual methods for how
/// missing axes on the argument are treated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vector(BTreeMap<String, f64>);

impl Vector {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, axis: impl Into<String>, value: f64) {
        self.0.insert(axis.into(), value);
    }

    pub fn get(&self, axis: &str) -> Option<f64> {
        self.0.get(axis).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Euclidean distance over the axes shared by both vectors.
    pub fn distance(&self, other: &Vector) -> f64 {
        let mut terms = 0.0;
        for (axis, v) in self.iter() {
            let Some(v2) = other.get(axis) else {
                continue;
            };
            terms += (v - v2) * (v - v2);
        }
        terms.sqrt()
    }

    /// Per-axis difference `other - self`, restricted to shared axes.
    pub fn delta(&self, other: &Vector) -> Vector {
        let mut delta = Vector::new();
        for (axis, v) in self.iter() {
            let Some(v2) = other.get(axis) else {
                continue;
            };
            delta.set(axis, v2 - v);
        }
        delta
    }

    pub fn divide(&self, scalar: f64) -> Vector {
        Vector(self.0.iter().map(|(k, v)| (k.clone(), v / scalar)).collect())
    }

    pub fn multiply(&self, scalar: f64) -> Vector {
        Vector(self.0.iter().map(|(k, v)| (k.clone(), v * scalar)).collect())
    }

    /// Adds `delta` axis-wise, keeping exactly the receiver's axes. An axis
    /// missing from `delta` passes through unchanged; axes only in `delta`
    /// are dropped.
    pub fn add(&self, delta: &Vector) -> Vector {
        let mut result = Vector::new();
        for (axis, v) in self.iter() {
            result.set(axis, v + delta.get(axis).unwrap_or(0.0));
        }
        result
    }

    /// `steps` interpolated points from `self` (exclusive) to `self + delta`
    /// (inclusive).
    pub fn path(&self, delta: &Vector, steps: usize) -> Vec<Vector> {
        let increment = delta.divide(steps as f64);
        let mut points = Vec::with_capacity(steps);
        let mut last = self.clone();
        for _ in 0..steps {
            let next = last.add(&increment);
            points.push(next.clone());
            last = next;
        }
        points
    }
}

impl<S: Into<String>, const N: usize> From<[(S, f64); N]> for Vector {
    fn from(axes: [(S, f64); N]) -> Self {
        Vector(axes.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl FromIterator<(String, f64)> for Vector {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Vector(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Vector::from([("a", 1.0), ("b", 1.0), ("not in b", 1.0)]);
        let b = Vector::from([("a", 2.0), ("b", 2.0), ("not in a", 3.0)]);
        assert_eq!(a.distance(&b), 2.0_f64.sqrt());
        assert_eq!(b.distance(&a), 2.0_f64.sqrt());
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_delta() {
        let a = Vector::from([("a", 1.0), ("b", 1.0), ("not in b", 1.0)]);
        let b = Vector::from([("a", 2.0), ("b", 2.0), ("not in a", 3.0)]);
        assert_eq!(a.delta(&b), Vector::from([("a", 1.0), ("b", 1.0)]));
    }

    #[test]
    fn test_divide() {
        let a = Vector::from([("a", 2.0), ("b", 2.0)]);
        assert_eq!(a.divide(2.0), Vector::from([("a", 1.0), ("b", 1.0)]));
    }

    #[test]
    fn test_multiply() {
        let a = Vector::from([("a", 1.0), ("b", 1.0)]);
        assert_eq!(a.multiply(2.0), Vector::from([("a", 2.0), ("b", 2.0)]));
    }

    #[test]
    fn test_add_keeps_receiver_axes() {
        let a = Vector::from([("a", 1.0), ("b", 1.0), ("not in b", 1.0)]);
        let b = Vector::from([("a", 2.0), ("b", 2.0), ("not in a", 2.0)]);
        assert_eq!(
            a.add(&b),
            Vector::from([("a", 3.0), ("b", 3.0), ("not in b", 1.0)])
        );
    }

    #[test]
    fn test_path() {
        let a = Vector::from([("a", 1.0), ("b", 1.0)]);
        let delta = Vector::from([("a", 3.0), ("b", 3.0), ("not in a", 5.0)]);
        let expect = vec![
            Vector::from([("a", 2.0), ("b", 2.0)]),
            Vector::from([("a", 3.0), ("b", 3.0)]),
            Vector::from([("a", 4.0), ("b", 4.0)]),
        ];
        assert_eq!(a.path(&delta, 3), expect);
    }

    #[test]
    fn test_path_last_point_is_sum() {
        let a = Vector::from([("x", 0.25), ("y", 0.5)]);
        let delta = Vector::from([("x", 0.5), ("y", -0.25)]);
        let path = a.path(&delta, 4);
        assert_eq!(path.len(), 4);
        let last = path.last().unwrap();
        assert!((last.get("x").unwrap() - 0.75).abs() < 1e-9);
        assert!((last.get("y").unwrap() - 0.25).abs() < 1e-9);
    }
}
