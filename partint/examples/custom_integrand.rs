//! A binary with its own integrand, usable by every executor.
//!
//! ```text
//! cargo run --example custom_integrand -- integrate -f gaussian --lower -3 --upper 3 -e process -j 4 -n 1000000
//! ```

fn gaussian(x: f64) -> f64 {
    (-x * x).exp()
}

partint::register_integrand!("gaussian", "exp(-x^2)", gaussian);

fn main() -> anyhow::Result<()> {
    partint::run()
}
