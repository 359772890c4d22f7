/// Glare tie-break: when both sides sent an offer, the lexicographically
/// smaller username keeps its offer and the other side answers it.
///
/// Both peers evaluate the same total order, so exactly one of them wins.
pub fn local_wins(local: &str, remote: &str) -> bool {
    local < remote
}
