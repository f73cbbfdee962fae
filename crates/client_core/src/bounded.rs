use std::collections::VecDeque;

/// Newest first, oldest dropped past `cap`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLog<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> BoundedLog<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        self.items.truncate(self.cap);
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_newest_items_first() {
        let mut log = BoundedLog::new(3);
        for n in 1..=5 {
            log.push(n);
        }
        assert_eq!(log.to_vec(), vec![5, 4, 3]);
        assert_eq!(log.newest(), Some(&5));
    }

    #[test]
    fn zero_cap_holds_nothing() {
        let mut log = BoundedLog::new(0);
        log.push("a");
        assert!(log.is_empty());
    }
}
