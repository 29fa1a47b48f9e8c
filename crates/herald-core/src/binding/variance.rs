/// Variance は要求された型と登録された制約の「ずれ」の許容方向
///
/// - `Covariant`: provide（要求より具体的な型を返してよい）
/// - `Contravariant`: handle（登録型のサブタイプを受け取れる）
/// - `Invariant`: lookup（完全一致のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variance {
    Covariant,
    Contravariant,
    Invariant,
}

impl Variance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variance::Covariant => "covariant",
            Variance::Contravariant => "contravariant",
            Variance::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for Variance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
