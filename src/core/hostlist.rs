// src/core/hostlist.rs

//! Compressed hostname range syntax: `node[1-3,5]` expands to
//! `node1, node2, node3, node5`, and the reverse compresses a name list back
//! into ranges for display. Node names throughout the controller travel as
//! expanded `Vec<String>` internally; this module only handles the wire/UI
//! text form.

use std::fmt::Write as _;

/// Expands a hostlist expression into individual host names, in the order
/// the ranges and literals appear in the expression.
pub fn expand(expr: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    for segment in split_top_level(expr, ',') {
        expand_segment(&segment, &mut out)?;
    }
    Ok(out)
}

fn expand_segment(segment: &str, out: &mut Vec<String>) -> Result<(), String> {
    let Some(open) = segment.find('[') else {
        if segment.is_empty() {
            return Err("empty hostlist segment".to_string());
        }
        out.push(segment.to_string());
        return Ok(());
    };
    if !segment.ends_with(']') {
        return Err(format!("unterminated range in \"{segment}\""));
    }
    let prefix = &segment[..open];
    let inner = &segment[open + 1..segment.len() - 1];

    for piece in inner.split(',') {
        if let Some((lo, hi)) = piece.split_once('-') {
            let width = lo.len();
            let lo_n: u64 = lo.parse().map_err(|_| format!("bad range start \"{lo}\""))?;
            let hi_n: u64 = hi.parse().map_err(|_| format!("bad range end \"{hi}\""))?;
            if lo_n > hi_n {
                return Err(format!("inverted range {lo}-{hi}"));
            }
            for n in lo_n..=hi_n {
                if lo.starts_with('0') && width > 1 {
                    out.push(format!("{prefix}{n:0width$}"));
                } else {
                    out.push(format!("{prefix}{n}"));
                }
            }
        } else {
            let n: u64 = piece.parse().map_err(|_| format!("bad index \"{piece}\""))?;
            if piece.starts_with('0') && piece.len() > 1 {
                let width = piece.len();
                out.push(format!("{prefix}{n:0width$}"));
            } else {
                out.push(format!("{prefix}{n}"));
            }
        }
    }
    Ok(())
}

/// Splits on `sep` but ignores separators nested inside `[...]`.
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '[' => {
                depth += 1;
                cur.push(c);
            }
            ']' => {
                depth -= 1;
                cur.push(c);
            }
            c if c == sep && depth == 0 => {
                parts.push(std::mem::take(&mut cur));
            }
            c => cur.push(c),
        }
    }
    parts.push(cur);
    parts
}

/// Splits a host name into a `(prefix, numeric_suffix)` pair, where the
/// suffix retains its original zero-padded width. Names with no trailing
/// digits have no numeric suffix.
fn split_prefix_numeric(name: &str) -> (&str, Option<(u64, usize)>) {
    let digit_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);
    match digit_start {
        Some(i) => {
            let digits = &name[i..];
            match digits.parse::<u64>() {
                Ok(n) => (&name[..i], Some((n, digits.len()))),
                Err(_) => (name, None),
            }
        }
        None => (name, None),
    }
}

/// Compresses a list of host names back into hostlist range syntax. Names
/// are grouped by their non-numeric prefix; groups are printed in canonical
/// order, sorted by prefix and then by numeric value, not by first
/// appearance. Within a group, contiguous numeric suffixes of matching width
/// collapse into a range.
pub fn compress(names: &[String]) -> String {
    let mut groups: Vec<(String, Vec<(u64, usize)>, Vec<String>)> = Vec::new();

    for name in names {
        match split_prefix_numeric(name) {
            (prefix, Some((n, width))) => {
                if let Some(group) = groups
                    .iter_mut()
                    .find(|(p, _, lits)| p == prefix && lits.is_empty())
                {
                    group.1.push((n, width));
                } else {
                    groups.push((prefix.to_string(), vec![(n, width)], Vec::new()));
                }
            }
            (_, None) => {
                // A literal (no numeric suffix) sorts by its own full name
                // rather than an empty prefix, so distinct literals don't
                // collapse to one sort key.
                groups.push((name.clone(), Vec::new(), vec![name.clone()]));
            }
        }
    }

    groups.sort_by(|a, b| {
        let a_min = a.1.iter().map(|&(n, _)| n).min().unwrap_or(0);
        let b_min = b.1.iter().map(|&(n, _)| n).min().unwrap_or(0);
        (a.0.as_str(), a_min).cmp(&(b.0.as_str(), b_min))
    });

    let mut out_parts = Vec::new();
    for (prefix, mut nums, lits) in groups {
        if !lits.is_empty() {
            out_parts.extend(lits);
            continue;
        }
        nums.sort_by_key(|&(n, _)| n);
        nums.dedup();
        let ranges = compress_numeric(&nums);
        if ranges.len() == 1 && !ranges[0].contains('-') && !ranges[0].contains(',') {
            out_parts.push(format!("{prefix}{}", ranges[0]));
        } else {
            let mut s = String::new();
            write!(s, "{prefix}[{}]", ranges.join(",")).ok();
            out_parts.push(s);
        }
    }
    out_parts.join(",")
}

fn compress_numeric(nums: &[(u64, usize)]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < nums.len() {
        let (start, width) = nums[i];
        let mut end = start;
        let mut j = i + 1;
        while j < nums.len() && nums[j].0 == end + 1 && nums[j].1 == width {
            end = nums[j].0;
            j += 1;
        }
        if start == end {
            out.push(format!("{start:0width$}"));
        } else {
            out.push(format!("{start:0width$}-{end:0width$}"));
        }
        i = j;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn expand_simple_range() {
        let got = expand("node[1-3,5]").unwrap();
        assert_eq!(got, vec!["node1", "node2", "node3", "node5"]);
    }

    #[test]
    fn expand_literal_no_brackets() {
        let got = expand("gateway").unwrap();
        assert_eq!(got, vec!["gateway"]);
    }

    #[test]
    fn expand_multiple_groups() {
        let got = expand("a[1-2],b[4-5]").unwrap();
        assert_eq!(got, vec!["a1", "a2", "b4", "b5"]);
    }

    #[test]
    fn expand_zero_padded() {
        let got = expand("node[001-003]").unwrap();
        assert_eq!(got, vec!["node001", "node002", "node003"]);
    }

    #[test]
    fn expand_rejects_inverted_range() {
        assert!(expand("node[5-1]").is_err());
    }

    #[test]
    fn compress_basic() {
        let names: Vec<String> = vec!["node1", "node2", "node3", "node5"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(compress(&names), "node[1-3,5]");
    }

    #[test]
    fn compress_single_name_no_brackets() {
        let names = vec!["gateway".to_string()];
        assert_eq!(compress(&names), "gateway");
    }

    #[test]
    fn compress_sorts_prefix_groups_canonically() {
        let names: Vec<String> = vec!["b1", "a1"].into_iter().map(String::from).collect();
        assert_eq!(compress(&names), "a1,b1");
    }

    proptest! {
        // P4: hostlist expand/compress round-trips for generated numeric node lists.
        #[test]
        fn expand_compress_roundtrip(nums in prop::collection::btree_set(0u64..200, 1..30)) {
            let names: Vec<String> = nums.iter().map(|n| format!("node{n}")).collect();
            let compressed = compress(&names);
            let expanded = expand(&compressed).unwrap();
            prop_assert_eq!(expanded, names);
        }
    }
}
