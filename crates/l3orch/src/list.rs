//! Caller-buffer list convention.
//!
//! The caller passes a slice sized to its capacity. The callee writes as
//! many items as fit and reports how many exist in total, so a short buffer
//! truncates instead of overflowing and the caller can retry with the
//! reported size.

/// Outcome of filling a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListResult {
    /// Items written to the front of the buffer.
    pub written: usize,
    /// Items available.
    pub total: usize,
}

impl ListResult {
    pub fn is_truncated(&self) -> bool {
        self.written < self.total
    }
}

pub(crate) fn fill<T>(buf: &mut [T], items: impl IntoIterator<Item = T>) -> ListResult {
    let mut result = ListResult::default();
    for item in items {
        if let Some(slot) = buf.get_mut(result.written) {
            *slot = item;
            result.written += 1;
        }
        result.total += 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fill_fits() {
        let mut buf = [0u32; 4];
        let result = fill(&mut buf, [1, 2, 3]);
        assert_eq!(result, ListResult { written: 3, total: 3 });
        assert!(!result.is_truncated());
        assert_eq!(buf, [1, 2, 3, 0]);
    }

    #[test]
    fn test_fill_truncates() {
        let mut buf = [0u32; 2];
        let result = fill(&mut buf, [7, 8, 9]);
        assert_eq!(result, ListResult { written: 2, total: 3 });
        assert!(result.is_truncated());
        assert_eq!(buf, [7, 8]);

        let mut empty: [u32; 0] = [];
        let result = fill(&mut empty, [1]);
        assert_eq!(result, ListResult { written: 0, total: 1 });
    }
}
