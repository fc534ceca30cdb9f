//! Verification codes embedded in signature links.
//!
//! A code binds a forum profile to the external forum account it claims:
//! it is the salted, reversible short encoding of the pair
//! `(profile id, forum user id)`. The scheme is Hashids v1 with the default
//! alphabet, so codes already pasted into live signatures keep decoding.

/// Minimum length of a code produced for a forum profile.
pub const MIN_CODE_LENGTH: usize = 8;

const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";
const DEFAULT_SEPARATORS: &str = "cfhistuCFHISTU";

/// Salted encoder/decoder for verification codes.
#[derive(Clone)]
pub struct VerificationCodec {
    salt: Vec<char>,
    min_length: usize,
    alphabet: Vec<char>,
    separators: Vec<char>,
    guards: Vec<char>,
}

impl std::fmt::Debug for VerificationCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationCodec")
            .field("salt", &"[redacted]")
            .field("min_length", &self.min_length)
            .finish_non_exhaustive()
    }
}

impl VerificationCodec {
    /// Codec used for forum profiles: salted with the application secret,
    /// codes at least [`MIN_CODE_LENGTH`] characters long.
    #[must_use]
    pub fn for_profiles(secret_key: &str) -> Self {
        Self::new(secret_key, MIN_CODE_LENGTH)
    }

    #[must_use]
    pub fn new(salt: &str, min_length: usize) -> Self {
        let salt: Vec<char> = salt.chars().collect();
        let source: Vec<char> = DEFAULT_ALPHABET.chars().collect();

        let mut separators: Vec<char> = DEFAULT_SEPARATORS
            .chars()
            .filter(|c| source.contains(c))
            .collect();
        let mut alphabet: Vec<char> = source
            .iter()
            .copied()
            .filter(|c| !separators.contains(c))
            .collect();

        consistent_shuffle(&mut separators, &salt);

        // One separator per 3.5 alphabet characters.
        let min_separators = (alphabet.len() * 2).div_ceil(7);
        if min_separators > separators.len() {
            let missing = min_separators - separators.len();
            separators.extend(alphabet.drain(..missing));
        }

        consistent_shuffle(&mut alphabet, &salt);

        let guard_count = alphabet.len().div_ceil(12);
        let guards: Vec<char> = if alphabet.len() < 3 {
            separators.drain(..guard_count).collect()
        } else {
            alphabet.drain(..guard_count).collect()
        };

        Self {
            salt,
            min_length,
            alphabet,
            separators,
            guards,
        }
    }

    /// Encode the `(profile id, forum user id)` pair of a forum profile.
    #[must_use]
    pub fn encode_profile(&self, profile_id: u64, forum_user_id: u64) -> String {
        self.encode(&[profile_id, forum_user_id])
    }

    /// `true` when `code` decodes to exactly `(profile_id, forum_user_id)`.
    #[must_use]
    pub fn matches_profile(&self, code: &str, profile_id: u64, forum_user_id: u64) -> bool {
        self.decode(code.trim())
            .is_some_and(|numbers| numbers == [profile_id, forum_user_id])
    }

    /// Encode a sequence of numbers. An empty input encodes to an empty string.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, numbers: &[u64]) -> String {
        if numbers.is_empty() {
            return String::new();
        }

        let mut alphabet = self.alphabet.clone();
        let alphabet_len = alphabet.len() as u64;
        let values_hash: u64 = numbers
            .iter()
            .enumerate()
            .map(|(i, n)| n % (i as u64 + 100))
            .sum();

        let lottery = alphabet[(values_hash % alphabet_len) as usize];
        let mut encoded = vec![lottery];

        for (i, &number) in numbers.iter().enumerate() {
            let round_salt = self.round_salt(lottery, &alphabet);
            consistent_shuffle(&mut alphabet, &round_salt);

            let last = to_alphabet(number, &alphabet);
            let first = u64::from(u32::from(last[0]));
            encoded.extend_from_slice(&last);

            let reduced = number % (first + i as u64);
            let separator = self.separators[(reduced % self.separators.len() as u64) as usize];
            encoded.push(separator);
        }
        encoded.pop();

        if encoded.len() < self.min_length {
            self.pad(&mut encoded, alphabet, values_hash);
        }

        encoded.into_iter().collect()
    }

    /// Decode a code back into its numbers.
    ///
    /// Returns `None` for anything that is not a well-formed code under this
    /// salt, including codes that decode but do not re-encode to themselves.
    #[must_use]
    pub fn decode(&self, code: &str) -> Option<Vec<u64>> {
        if code.is_empty() {
            return None;
        }

        let chars: Vec<char> = code.chars().collect();
        let parts: Vec<&[char]> = chars.split(|c| self.guards.contains(c)).collect();
        let core = if (2..=3).contains(&parts.len()) {
            parts[1]
        } else {
            parts[0]
        };

        let (&lottery, rest) = core.split_first()?;
        let mut alphabet = self.alphabet.clone();
        let mut numbers = Vec::new();

        for part in rest.split(|c| self.separators.contains(c)) {
            let round_salt = self.round_salt(lottery, &alphabet);
            consistent_shuffle(&mut alphabet, &round_salt);
            numbers.push(from_alphabet(part, &alphabet)?);
        }

        (self.encode(&numbers) == code).then_some(numbers)
    }

    fn round_salt(&self, lottery: char, alphabet: &[char]) -> Vec<char> {
        std::iter::once(lottery)
            .chain(self.salt.iter().copied())
            .chain(alphabet.iter().copied())
            .take(alphabet.len())
            .collect()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn pad(&self, encoded: &mut Vec<char>, mut alphabet: Vec<char>, values_hash: u64) {
        let guard_len = self.guards.len() as u64;

        let index = (values_hash + u64::from(u32::from(encoded[0]))) % guard_len;
        encoded.insert(0, self.guards[index as usize]);

        if encoded.len() < self.min_length {
            let index = (values_hash + u64::from(u32::from(encoded[2]))) % guard_len;
            encoded.push(self.guards[index as usize]);
        }

        let split_at = alphabet.len() / 2;
        while encoded.len() < self.min_length {
            let salt = alphabet.clone();
            consistent_shuffle(&mut alphabet, &salt);

            let mut widened = alphabet[split_at..].to_vec();
            widened.extend_from_slice(encoded);
            widened.extend_from_slice(&alphabet[..split_at]);
            *encoded = widened;

            let excess = encoded.len().saturating_sub(self.min_length);
            if excess > 0 {
                let from = excess / 2;
                *encoded = encoded[from..from + self.min_length].to_vec();
            }
        }
    }
}

/// Deterministic salt-driven permutation of `chars` in place.
fn consistent_shuffle(chars: &mut [char], salt: &[char]) {
    if salt.is_empty() {
        return;
    }

    let mut index = 0usize;
    let mut sum = 0usize;
    for i in (1..chars.len()).rev() {
        let integer = salt[index] as usize;
        sum += integer;
        let j = (integer + index + sum) % i;
        chars.swap(i, j);
        index = (index + 1) % salt.len();
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_alphabet(mut number: u64, alphabet: &[char]) -> Vec<char> {
    let base = alphabet.len() as u64;
    let mut out = Vec::new();
    loop {
        out.push(alphabet[(number % base) as usize]);
        number /= base;
        if number == 0 {
            break;
        }
    }
    out.reverse();
    out
}

fn from_alphabet(part: &[char], alphabet: &[char]) -> Option<u64> {
    let base = alphabet.len() as u64;
    part.iter().try_fold(0u64, |acc, c| {
        let position = alphabet.iter().position(|a| a == c)? as u64;
        acc.checked_mul(base)?.checked_add(position)
    })
}
