/// Exact integer square root, `floor(sqrt(num))`.
///
/// Builds the root one bit at a time from the top, using the binomial
/// expansion `(u + v)^2 = u^2 + v * (2u + v)` so no floating point is
/// involved. Intermediate squares are kept in `u128`, which makes the whole
/// `u64` range safe.
pub fn isqrt(num: u64) -> u64 {
    if num < 2 {
        return num;
    }

    // l2 = floor(log4(num)), so (2^l2)^2 <= num
    let mut l2 = 0u32;
    let mut t = num;
    loop {
        t >>= 2;
        if t == 0 {
            break;
        }
        l2 += 1;
    }

    let target = num as u128;
    let mut u: u128 = 1 << l2;
    let mut v: u128 = u;
    let mut u2: u128 = u << l2;
    while l2 > 0 {
        l2 -= 1;
        v >>= 1;
        let n = ((u + u + v) << l2) + u2;
        if n <= target {
            u += v;
            u2 = n;
        }
    }
    u as u64
}
