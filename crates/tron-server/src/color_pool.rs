use std::collections::VecDeque;

use tron_lib::player::Color;

/// Fixed set of colors handed out to players.
///
/// Colors live in fixed slots; the pool only tracks which slots are free, in the order they
/// were freed. Allocation takes from the front and release appends to the back, so the color
/// freed first is the first one reused.
#[derive(Debug)]
pub struct ColorPool {
    slots: Vec<Color>,
    free: VecDeque<usize>,
}

impl ColorPool {
    pub fn new(colors: Vec<Color>) -> Self {
        let free = (0..colors.len()).collect();
        Self {
            slots: colors,
            free,
        }
    }

    /// Take the next free color, or `None` if every color is held by a player.
    pub fn allocate(&mut self) -> Option<Color> {
        let slot = self.free.pop_front()?;
        Some(self.slots[slot].clone())
    }

    /// Return a color to the back of the pool.
    pub fn release(&mut self, color: &Color) {
        let Some(slot) = self.slots.iter().position(|c| c == color) else {
            tracing::warn!("Attempted to release color {color} which is not part of the pool");
            return;
        };
        if self.free.contains(&slot) {
            tracing::warn!("Attempted to release color {color} which is not in use");
            return;
        }
        self.free.push_back(slot);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod test {
    use tron_lib::player::Color;

    use super::ColorPool;

    fn color(s: &str) -> Color {
        s.parse().unwrap()
    }

    #[test]
    fn allocate_in_order() {
        let mut pool = ColorPool::new(Color::defaults());
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.allocate(), Some(color("#ff0000")));
        assert_eq!(pool.allocate(), Some(color("#00ff00")));
        assert_eq!(pool.allocate(), Some(color("#0000ff")));

        // Exhausted
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn first_freed_first_reused() {
        let mut pool = ColorPool::new(Color::defaults());
        let red = pool.allocate().unwrap();
        let green = pool.allocate().unwrap();
        let blue = pool.allocate().unwrap();

        pool.release(&green);
        pool.release(&red);
        assert_eq!(pool.allocate(), Some(green));
        assert_eq!(pool.allocate(), Some(red));
        assert_eq!(pool.allocate(), None);

        pool.release(&blue);
        assert_eq!(pool.allocate(), Some(blue));
    }

    #[test]
    fn released_color_goes_to_the_back() {
        let mut pool = ColorPool::new(Color::defaults());
        let red = pool.allocate().unwrap();
        pool.release(&red);

        assert_eq!(pool.allocate(), Some(color("#00ff00")));
        assert_eq!(pool.allocate(), Some(color("#0000ff")));
        assert_eq!(pool.allocate(), Some(red));
    }

    #[test]
    fn bogus_release_is_ignored() {
        let mut pool = ColorPool::new(Color::defaults());

        // Never allocated
        pool.release(&color("#ff0000"));
        // Not in the pool at all
        pool.release(&color("#123456"));
        assert_eq!(pool.available(), 3);

        let red = pool.allocate().unwrap();
        pool.release(&red);
        pool.release(&red);
        assert_eq!(pool.available(), 3);
    }
}
