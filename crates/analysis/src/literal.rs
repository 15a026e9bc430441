use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// A constant value of the analyzed language.
///
/// Numeric literals follow JVM semantics: 32 and 64 bit two's complement integers that wrap on
/// overflow, and IEEE 754 single and double precision floats.
#[derive(Debug, Clone)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Null,
}

// Literals are equal only if they have the same kind and bit pattern, so `Int(1) != Long(1)`,
// `0.0 != -0.0` and `NaN == NaN`. This is the equality the constant lattice needs, not the
// language's `==`.
impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Int(a), Literal::Int(b)) => a == b,
            (Literal::Long(a), Literal::Long(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            (Literal::Double(a), Literal::Double(b)) => a.to_bits() == b.to_bits(),
            (Literal::String(a), Literal::String(b)) => a == b,
            (Literal::Null, Literal::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Literal::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            Literal::Long(l) => {
                1u8.hash(state);
                l.hash(state);
            }
            Literal::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Literal::Double(d) => {
                3u8.hash(state);
                d.to_bits().hash(state);
            }
            Literal::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Literal::Null => {
                5u8.hash(state);
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Long(l) => write!(f, "{l}L"),
            Literal::Float(v) => write!(f, "{v:?}F"),
            Literal::Double(v) => write!(f, "{v:?}"),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Int(i)
    }
}

impl From<i64> for Literal {
    fn from(l: i64) -> Self {
        Literal::Long(l)
    }
}

impl From<f32> for Literal {
    fn from(f: f32) -> Self {
        Literal::Float(f)
    }
}

impl From<f64> for Literal {
    fn from(d: f64) -> Self {
        Literal::Double(d)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Int(b as i32)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_owned())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

/// Two numeric operands after binary numeric promotion.
#[derive(Debug, Copy, Clone)]
enum Promoted {
    Int(i32, i32),
    Long(i64, i64),
    Float(f32, f32),
    Double(f64, f64),
}

impl Promoted {
    fn new(a: &Literal, b: &Literal) -> Option<Self> {
        Some(match (a, b) {
            (&Literal::Int(a), &Literal::Int(b)) => Promoted::Int(a, b),
            (Literal::Double(_), _) | (_, Literal::Double(_)) => {
                Promoted::Double(a.to_double()?, b.to_double()?)
            }
            (Literal::Float(_), _) | (_, Literal::Float(_)) => {
                Promoted::Float(a.to_float()?, b.to_float()?)
            }
            _ => Promoted::Long(a.to_long()?, b.to_long()?),
        })
    }

    fn compare(self) -> Option<Ordering> {
        match self {
            Promoted::Int(a, b) => Some(a.cmp(&b)),
            Promoted::Long(a, b) => Some(a.cmp(&b)),
            Promoted::Float(a, b) => a.partial_cmp(&b),
            Promoted::Double(a, b) => a.partial_cmp(&b),
        }
    }
}

fn ordering_to_int(ord: Ordering) -> Literal {
    Literal::Int(match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

impl Literal {
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Literal::Int(_) | Literal::Long(_) | Literal::Float(_) | Literal::Double(_)
        )
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        matches!(self, Literal::String(_) | Literal::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Literal::Int(_) => "int",
            Literal::Long(_) => "long",
            Literal::Float(_) => "float",
            Literal::Double(_) => "double",
            Literal::String(_) => "string",
            Literal::Null => "null",
        }
    }

    /// Branch conditions are `int` valued, any non-zero value is taken.
    #[inline]
    pub fn as_condition(&self) -> Option<bool> {
        match *self {
            Literal::Int(i) => Some(i != 0),
            _ => None,
        }
    }

    #[inline]
    pub fn to_long(&self) -> Option<i64> {
        match *self {
            Literal::Int(i) => Some(i as i64),
            Literal::Long(l) => Some(l),
            _ => None,
        }
    }

    #[inline]
    pub fn to_float(&self) -> Option<f32> {
        match *self {
            Literal::Int(i) => Some(i as f32),
            Literal::Long(l) => Some(l as f32),
            Literal::Float(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    pub fn to_double(&self) -> Option<f64> {
        match *self {
            Literal::Int(i) => Some(i as f64),
            Literal::Long(l) => Some(l as f64),
            Literal::Float(f) => Some(f as f64),
            Literal::Double(d) => Some(d),
            _ => None,
        }
    }

    #[inline]
    pub fn add(&self, other: &Literal) -> Option<Literal> {
        Some(match Promoted::new(self, other)? {
            Promoted::Int(a, b) => Literal::Int(a.wrapping_add(b)),
            Promoted::Long(a, b) => Literal::Long(a.wrapping_add(b)),
            Promoted::Float(a, b) => Literal::Float(a + b),
            Promoted::Double(a, b) => Literal::Double(a + b),
        })
    }

    #[inline]
    pub fn sub(&self, other: &Literal) -> Option<Literal> {
        Some(match Promoted::new(self, other)? {
            Promoted::Int(a, b) => Literal::Int(a.wrapping_sub(b)),
            Promoted::Long(a, b) => Literal::Long(a.wrapping_sub(b)),
            Promoted::Float(a, b) => Literal::Float(a - b),
            Promoted::Double(a, b) => Literal::Double(a - b),
        })
    }

    #[inline]
    pub fn mul(&self, other: &Literal) -> Option<Literal> {
        Some(match Promoted::new(self, other)? {
            Promoted::Int(a, b) => Literal::Int(a.wrapping_mul(b)),
            Promoted::Long(a, b) => Literal::Long(a.wrapping_mul(b)),
            Promoted::Float(a, b) => Literal::Float(a * b),
            Promoted::Double(a, b) => Literal::Double(a * b),
        })
    }

    /// Integer division by zero traps at runtime, so it has no constant result.
    #[inline]
    pub fn div(&self, other: &Literal) -> Option<Literal> {
        Some(match Promoted::new(self, other)? {
            Promoted::Int(_, 0) | Promoted::Long(_, 0) => return None,
            Promoted::Int(a, b) => Literal::Int(a.wrapping_div(b)),
            Promoted::Long(a, b) => Literal::Long(a.wrapping_div(b)),
            Promoted::Float(a, b) => Literal::Float(a / b),
            Promoted::Double(a, b) => Literal::Double(a / b),
        })
    }

    #[inline]
    pub fn rem(&self, other: &Literal) -> Option<Literal> {
        Some(match Promoted::new(self, other)? {
            Promoted::Int(_, 0) | Promoted::Long(_, 0) => return None,
            Promoted::Int(a, b) => Literal::Int(a.wrapping_rem(b)),
            Promoted::Long(a, b) => Literal::Long(a.wrapping_rem(b)),
            Promoted::Float(a, b) => Literal::Float(a % b),
            Promoted::Double(a, b) => Literal::Double(a % b),
        })
    }

    fn shift_distance(&self) -> Option<u32> {
        // Only the low bits are used; the mask is applied by the caller.
        self.to_long().map(|d| d as u32)
    }

    #[inline]
    pub fn shl(&self, other: &Literal) -> Option<Literal> {
        let d = other.shift_distance()?;
        match *self {
            Literal::Int(a) => Some(Literal::Int(a.wrapping_shl(d & 0x1f))),
            Literal::Long(a) => Some(Literal::Long(a.wrapping_shl(d & 0x3f))),
            _ => None,
        }
    }

    #[inline]
    pub fn shr(&self, other: &Literal) -> Option<Literal> {
        let d = other.shift_distance()?;
        match *self {
            Literal::Int(a) => Some(Literal::Int(a.wrapping_shr(d & 0x1f))),
            Literal::Long(a) => Some(Literal::Long(a.wrapping_shr(d & 0x3f))),
            _ => None,
        }
    }

    #[inline]
    pub fn ushr(&self, other: &Literal) -> Option<Literal> {
        let d = other.shift_distance()?;
        match *self {
            Literal::Int(a) => Some(Literal::Int((a as u32).wrapping_shr(d & 0x1f) as i32)),
            Literal::Long(a) => Some(Literal::Long((a as u64).wrapping_shr(d & 0x3f) as i64)),
            _ => None,
        }
    }

    #[inline]
    pub fn bit_and(&self, other: &Literal) -> Option<Literal> {
        match Promoted::new(self, other)? {
            Promoted::Int(a, b) => Some(Literal::Int(a & b)),
            Promoted::Long(a, b) => Some(Literal::Long(a & b)),
            _ => None,
        }
    }

    #[inline]
    pub fn bit_or(&self, other: &Literal) -> Option<Literal> {
        match Promoted::new(self, other)? {
            Promoted::Int(a, b) => Some(Literal::Int(a | b)),
            Promoted::Long(a, b) => Some(Literal::Long(a | b)),
            _ => None,
        }
    }

    #[inline]
    pub fn bit_xor(&self, other: &Literal) -> Option<Literal> {
        match Promoted::new(self, other)? {
            Promoted::Int(a, b) => Some(Literal::Int(a ^ b)),
            Promoted::Long(a, b) => Some(Literal::Long(a ^ b)),
            _ => None,
        }
    }

    /// The `lcmp` comparison, defined for integral operands only.
    #[inline]
    pub fn cmp(&self, other: &Literal) -> Option<Literal> {
        match Promoted::new(self, other)? {
            p @ (Promoted::Int(..) | Promoted::Long(..)) => p.compare().map(ordering_to_int),
            _ => None,
        }
    }

    /// Floating point comparison where an unordered (NaN) operand yields `-1`.
    #[inline]
    pub fn cmpl(&self, other: &Literal) -> Option<Literal> {
        Some(ordering_to_int(
            Promoted::new(self, other)?
                .compare()
                .unwrap_or(Ordering::Less),
        ))
    }

    /// Floating point comparison where an unordered (NaN) operand yields `1`.
    #[inline]
    pub fn cmpg(&self, other: &Literal) -> Option<Literal> {
        Some(ordering_to_int(
            Promoted::new(self, other)?
                .compare()
                .unwrap_or(Ordering::Greater),
        ))
    }

    /// The language's `==`.
    ///
    /// References are only comparable when at least one side is `null`; two strings may or may
    /// not be the same object, so their identity is unknown.
    #[inline]
    pub fn equal(&self, other: &Literal) -> Option<bool> {
        match (self, other) {
            (Literal::Null, Literal::Null) => Some(true),
            (Literal::Null, Literal::String(_)) | (Literal::String(_), Literal::Null) => {
                Some(false)
            }
            (Literal::String(_), Literal::String(_)) => None,
            (a, b) => Some(Promoted::new(a, b)?.compare() == Some(Ordering::Equal)),
        }
    }

    #[inline]
    pub fn less_than(&self, other: &Literal) -> Option<bool> {
        Some(Promoted::new(self, other)?.compare() == Some(Ordering::Less))
    }

    #[inline]
    pub fn less_equal(&self, other: &Literal) -> Option<bool> {
        Some(matches!(
            Promoted::new(self, other)?.compare(),
            Some(Ordering::Less | Ordering::Equal)
        ))
    }
}
