/// Pixel rectangle inside an atlas surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn intersects(&self, other: &AtlasRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Normalized coordinates of this rectangle on a square surface.
    pub fn uv(&self, dimension: u32) -> UvRect {
        let d = dimension as f32;
        UvRect {
            u0: self.x as f32 / d,
            v0: self.y as f32 / d,
            u1: self.right() as f32 / d,
            v1: self.bottom() as f32 / d,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

#[derive(Debug, Clone)]
struct Shelf {
    y: u32,
    height: u32,
    cursor: u32,
}

/// Shelf packer for one square surface. Rows ("shelves") are opened top to
/// bottom; a sprite goes on the lowest-waste shelf that still has room.
/// Space is never reclaimed; the atlas drops the whole packer on reset.
#[derive(Debug, Clone)]
pub struct ShelfPacker {
    dimension: u32,
    padding: u32,
    shelves: Vec<Shelf>,
    next_y: u32,
    allocations: usize,
}

impl ShelfPacker {
    pub fn new(dimension: u32, padding: u32) -> Self {
        Self {
            dimension,
            padding,
            shelves: Vec::new(),
            next_y: 0,
            allocations: 0,
        }
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn allocate(&mut self, width: u32, height: u32) -> Option<AtlasRect> {
        if width == 0 || height == 0 || width > self.dimension || height > self.dimension {
            return None;
        }

        let dimension = self.dimension;
        let best = self
            .shelves
            .iter_mut()
            .filter(|shelf| {
                shelf.height >= height
                    && shelf.cursor.checked_add(width).is_some_and(|right| right <= dimension)
            })
            .min_by_key(|shelf| shelf.height - height);

        let rect = match best {
            Some(shelf) => {
                let rect = AtlasRect {
                    x: shelf.cursor,
                    y: shelf.y,
                    width,
                    height,
                };
                shelf.cursor = shelf.cursor.saturating_add(width).saturating_add(self.padding);
                rect
            }
            None => {
                if self.next_y.checked_add(height)? > dimension {
                    return None;
                }
                let y = self.next_y;
                self.next_y = y.saturating_add(height).saturating_add(self.padding);
                self.shelves.push(Shelf {
                    y,
                    height,
                    cursor: width.saturating_add(self.padding),
                });
                AtlasRect {
                    x: 0,
                    y,
                    width,
                    height,
                }
            }
        };

        self.allocations += 1;
        Some(rect)
    }
}
