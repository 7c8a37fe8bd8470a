//! Array payloads.

use crate::{HostObject, HostType, HostValue};

/// Payload of an array object.
///
/// Elements are stored row-major; `lengths` has one entry per dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    lengths: Vec<usize>,
    elements: Vec<HostValue>,
}

impl ArrayData {
    /// A one-dimensional array holding `elements`.
    pub fn from_vec(elements: Vec<HostValue>) -> Self {
        Self {
            lengths: vec![elements.len()],
            elements,
        }
    }

    /// An array with the given dimension lengths, filled with `fill`.
    pub fn with_lengths(lengths: Vec<usize>, fill: HostValue) -> Self {
        let count = lengths.iter().product();
        Self {
            lengths,
            elements: vec![fill; count],
        }
    }

    /// Wrap into an array object of `element` type.
    pub fn into_object(self, element: HostType) -> HostObject {
        let rank = u8::try_from(self.lengths.len()).unwrap_or(u8::MAX);
        HostObject::new(HostType::array_with_rank(element, rank), self)
    }

    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[HostValue] {
        &self.elements
    }

    /// Row-major offset of `indices`, or `None` when the rank or any index
    /// is out of range.
    pub fn offset(&self, indices: &[i64]) -> Option<usize> {
        if indices.len() != self.lengths.len() {
            return None;
        }
        let mut offset = 0usize;
        for (&index, &length) in indices.iter().zip(&self.lengths) {
            let index = usize::try_from(index).ok().filter(|&i| i < length)?;
            offset = offset * length + index;
        }
        Some(offset)
    }

    pub fn get(&self, indices: &[i64]) -> Option<&HostValue> {
        self.offset(indices).map(|offset| &self.elements[offset])
    }

    /// Store `value` at `indices`. Returns `false` when out of range.
    pub fn set(&mut self, indices: &[i64], value: HostValue) -> bool {
        match self.offset(indices) {
            Some(offset) => {
                self.elements[offset] = value;
                true
            }
            None => false,
        }
    }
}
