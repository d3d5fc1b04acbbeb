use rand::Rng;

/// Generates a random token of size N bytes, encoded in base58.
pub fn generate_token<const N: usize>(mut rng: impl Rng) -> eyre::Result<String> {
    let mut token = [0u8; N];
    rng.try_fill_bytes(&mut token)?;
    Ok(bs58::encode(token).into_string())
}
