const MODULUS: u64 = 2_147_483_647;
const MULTIPLIER: u64 = 16_807;

/// Park-Miller minimal standard generator. The stream must stay bit-compatible
/// with the browser client so both sides derive the same city layout.
#[derive(Clone, Debug)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u32) -> Self {
        // A zero state would lock the generator at zero forever.
        let state = u64::from(seed) % MODULUS;
        Self {
            state: if state == 0 { 1 } else { state },
        }
    }

    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state * MULTIPLIER % MODULUS;
        self.state as f64 / MODULUS as f64
    }

    pub fn next_f32(&mut self) -> f32 {
        self.next_f64() as f32
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        self.range_f64(f64::from(min), f64::from(max)) as f32
    }

    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }

    /// Uniform integer in `[0, span)`.
    pub fn below(&mut self, span: u32) -> u32 {
        (self.next_f64() * f64::from(span)).floor() as u32
    }
}
