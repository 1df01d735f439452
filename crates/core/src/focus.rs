#[must_use]
pub fn advance(index: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (index + 1) % count
}

#[must_use]
pub fn retreat(index: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (index % count + count - 1) % count
}
