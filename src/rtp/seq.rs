use std::cmp::Ordering;

/// Signed distance from `a` to `b` in the circular 16 bit sequence space.
///
/// Two numbers more than half the space apart are considered to have
/// wrapped, i.e. `seq_diff(65535, 0) == 1`.
pub fn seq_diff(a: u16, b: u16) -> i16 {
    b.wrapping_sub(a) as i16
}

/// Orders two 16 bit sequence numbers taking wrap-around into account.
pub fn seq_cmp(a: u16, b: u16) -> Ordering {
    0.cmp(&seq_diff(a, b))
}

/// Tells if `b` is circularly later than `a`.
pub fn seq_is_newer(a: u16, b: u16) -> bool {
    seq_diff(a, b) > 0
}
