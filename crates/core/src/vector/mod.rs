//! Origin-destination flow vectors

use geo_types::Coord;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which endpoint of a flow locates it in space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Anchor {
    /// Locate each vector by its start point
    #[default]
    Origin,
    /// Locate each vector by its end point
    Destination,
}

/// A single movement from an origin to a destination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowVector {
    /// Caller-supplied identifier
    pub id: u64,
    /// Start point
    pub origin: Coord<f64>,
    /// End point
    pub destination: Coord<f64>,
}

impl FlowVector {
    pub fn new(id: u64, origin: Coord<f64>, destination: Coord<f64>) -> Self {
        Self { id, origin, destination }
    }

    /// Displacement `destination - origin`
    #[inline]
    pub fn displacement(&self) -> Coord<f64> {
        self.destination - self.origin
    }

    /// The endpoint selected by `anchor`
    #[inline]
    pub fn anchor(&self, anchor: Anchor) -> Coord<f64> {
        match anchor {
            Anchor::Origin => self.origin,
            Anchor::Destination => self.destination,
        }
    }

    fn is_finite(&self) -> bool {
        self.origin.x.is_finite()
            && self.origin.y.is_finite()
            && self.destination.x.is_finite()
            && self.destination.y.is_finite()
    }
}

/// An ordered, immutable set of observed flow vectors.
///
/// The order is significant: index `i` of the sample corresponds to row and
/// column `i` of any spatial weights used with it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorSample {
    vectors: Vec<FlowVector>,
}

impl VectorSample {
    /// Create a sample, rejecting non-finite coordinates
    pub fn new(vectors: Vec<FlowVector>) -> Result<Self> {
        if let Some(bad) = vectors.iter().find(|v| !v.is_finite()) {
            return Err(Error::NumericError(format!(
                "vector {} has a non-finite coordinate",
                bad.id
            )));
        }
        Ok(Self { vectors })
    }

    /// Build from `(id, origin_x, origin_y, dest_x, dest_y)` tuples
    pub fn from_tuples(rows: &[(u64, f64, f64, f64, f64)]) -> Result<Self> {
        Self::new(
            rows.iter()
                .map(|&(id, ox, oy, dx, dy)| {
                    FlowVector::new(id, Coord { x: ox, y: oy }, Coord { x: dx, y: dy })
                })
                .collect(),
        )
    }

    /// Build from two parallel point sequences. Ids are assigned `0..n`.
    pub fn from_points(origins: &[Coord<f64>], destinations: &[Coord<f64>]) -> Result<Self> {
        if origins.len() != destinations.len() {
            return Err(Error::InvalidParameter {
                name: "destinations",
                value: destinations.len().to_string(),
                reason: format!("expected {} points to match origins", origins.len()),
            });
        }
        Self::new(
            origins
                .iter()
                .zip(destinations)
                .enumerate()
                .map(|(i, (&o, &d))| FlowVector::new(i as u64, o, d))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FlowVector> {
        self.vectors.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowVector> {
        self.vectors.iter()
    }

    pub fn as_slice(&self) -> &[FlowVector] {
        &self.vectors
    }

    pub fn origins(&self) -> impl Iterator<Item = Coord<f64>> + '_ {
        self.vectors.iter().map(|v| v.origin)
    }

    pub fn destinations(&self) -> impl Iterator<Item = Coord<f64>> + '_ {
        self.vectors.iter().map(|v| v.destination)
    }

    /// Points locating each vector, in sample order
    pub fn anchor_points(&self, anchor: Anchor) -> Vec<Coord<f64>> {
        self.vectors.iter().map(|v| v.anchor(anchor)).collect()
    }

    /// Component-wise mean of the origins, `None` for an empty sample
    pub fn mean_origin(&self) -> Option<Coord<f64>> {
        mean_coord(self.origins(), self.len())
    }

    /// Component-wise mean of the destinations, `None` for an empty sample
    pub fn mean_destination(&self) -> Option<Coord<f64>> {
        mean_coord(self.destinations(), self.len())
    }

    /// Reorder the sample so that new index `k` holds old index `order[k]`.
    pub fn permuted(&self, order: &[usize]) -> Result<Self> {
        check_permutation(order, self.len())?;
        Ok(Self {
            vectors: order.iter().map(|&i| self.vectors[i]).collect(),
        })
    }
}

impl<'a> IntoIterator for &'a VectorSample {
    type Item = &'a FlowVector;
    type IntoIter = std::slice::Iter<'a, FlowVector>;

    fn into_iter(self) -> Self::IntoIter {
        self.vectors.iter()
    }
}

fn mean_coord(points: impl Iterator<Item = Coord<f64>>, n: usize) -> Option<Coord<f64>> {
    if n == 0 {
        return None;
    }
    let sum = points.fold(Coord { x: 0.0, y: 0.0 }, |acc, p| acc + p);
    Some(Coord {
        x: sum.x / n as f64,
        y: sum.y / n as f64,
    })
}

/// Check that `order` is a permutation of `0..n`
pub(crate) fn check_permutation(order: &[usize], n: usize) -> Result<()> {
    if order.len() != n {
        return Err(Error::InvalidParameter {
            name: "order",
            value: order.len().to_string(),
            reason: format!("permutation length must equal {}", n),
        });
    }
    let mut seen = vec![false; n];
    for &i in order {
        if i >= n || seen[i] {
            return Err(Error::InvalidParameter {
                name: "order",
                value: i.to_string(),
                reason: "not a permutation of 0..n".into(),
            });
        }
        seen[i] = true;
    }
    Ok(())
}
