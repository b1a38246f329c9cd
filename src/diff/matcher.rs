// Sequence alignment shared by every diff view. Produces classified runs
// (equal/replace/delete/insert); replace is its own opcode and is never
// split into synthetic delete+insert pairs.
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// A classified aligned run: `old` indexes into the old sequence, `new`
/// into the new one. Half-open ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    pub tag: Tag,
    pub old_start: usize,
    pub old_end: usize,
    pub new_start: usize,
    pub new_end: usize,
}

#[derive(Debug, Clone, Copy)]
struct Match {
    a: usize,
    b: usize,
    size: usize,
}

/// Longest-matching-block aligner over two sequences.
pub struct SequenceMatcher<'a, T: Eq + Hash> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, item) in b.iter().enumerate() {
            b2j.entry(item).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    /// Longest block such that a[i..i+size] == b[j..j+size] within the
    /// given window, preferring the earliest block on ties.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let mut best = Match { a: alo, b: blo, size: 0 };
        // j2len[j] = length of the longest common suffix ending at
        // a[i] / b[j]; rebuilt per row.
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut new_j2len: HashMap<usize, usize> = HashMap::new();
            if let Some(indices) = self.b2j.get(&self.a[i]) {
                for &j in indices {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = if j > 0 {
                        j2len.get(&(j - 1)).copied().unwrap_or(0) + 1
                    } else {
                        1
                    };
                    new_j2len.insert(j, k);
                    if k > best.size {
                        best = Match {
                            a: i + 1 - k,
                            b: j + 1 - k,
                            size: k,
                        };
                    }
                }
            }
            j2len = new_j2len;
        }

        best
    }

    fn matching_blocks(&self) -> Vec<Match> {
        let mut queue = vec![(0usize, self.a.len(), 0usize, self.b.len())];
        let mut blocks: Vec<Match> = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size > 0 {
                blocks.push(m);
                if alo < m.a && blo < m.b {
                    queue.push((alo, m.a, blo, m.b));
                }
                if m.a + m.size < ahi && m.b + m.size < bhi {
                    queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
                }
            }
        }

        blocks.sort_by_key(|m| (m.a, m.b));

        // Coalesce adjacent blocks, then add the end sentinel.
        let mut merged: Vec<Match> = Vec::new();
        for block in blocks {
            match merged.last_mut() {
                Some(last) if last.a + last.size == block.a && last.b + last.size == block.b => {
                    last.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        merged.push(Match {
            a: self.a.len(),
            b: self.b.len(),
            size: 0,
        });
        merged
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        let mut ops = Vec::new();
        let mut i = 0;
        let mut j = 0;

        for m in self.matching_blocks() {
            let tag = match (i < m.a, j < m.b) {
                (true, true) => Some(Tag::Replace),
                (true, false) => Some(Tag::Delete),
                (false, true) => Some(Tag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                ops.push(Opcode {
                    tag,
                    old_start: i,
                    old_end: m.a,
                    new_start: j,
                    new_end: m.b,
                });
            }
            if m.size > 0 {
                ops.push(Opcode {
                    tag: Tag::Equal,
                    old_start: m.a,
                    old_end: m.a + m.size,
                    new_start: m.b,
                    new_end: m.b + m.size,
                });
            }
            i = m.a + m.size;
            j = m.b + m.size;
        }

        ops
    }

    /// Opcodes split into change hunks with up to `context` equal lines
    /// around each change, for unified-diff style output.
    pub fn grouped_opcodes(&self, context: usize) -> Vec<Vec<Opcode>> {
        let mut codes = self.opcodes();
        if codes.is_empty() || codes.iter().all(|op| op.tag == Tag::Equal) {
            return Vec::new();
        }

        // Shrink the leading and trailing equal runs to the context size.
        if let Some(first) = codes.first_mut() {
            if first.tag == Tag::Equal {
                first.old_start = first.old_end.saturating_sub(context).max(first.old_start);
                first.new_start = first.new_end.saturating_sub(context).max(first.new_start);
            }
        }
        if let Some(last) = codes.last_mut() {
            if last.tag == Tag::Equal {
                last.old_end = (last.old_start + context).min(last.old_end);
                last.new_end = (last.new_start + context).min(last.new_end);
            }
        }

        let mut groups = Vec::new();
        let mut group: Vec<Opcode> = Vec::new();
        for op in codes {
            if op.tag == Tag::Equal && op.old_end - op.old_start > context * 2 && !group.is_empty()
            {
                group.push(Opcode {
                    tag: Tag::Equal,
                    old_start: op.old_start,
                    old_end: op.old_start + context,
                    new_start: op.new_start,
                    new_end: op.new_start + context,
                });
                groups.push(group);
                group = vec![Opcode {
                    tag: Tag::Equal,
                    old_start: op.old_end - context,
                    old_end: op.old_end,
                    new_start: op.new_end - context,
                    new_end: op.new_end,
                }];
            } else {
                group.push(op);
            }
        }
        if !group.is_empty() && !(group.len() == 1 && group[0].tag == Tag::Equal) {
            groups.push(group);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opcodes(a: &[&str], b: &[&str]) -> Vec<Opcode> {
        SequenceMatcher::new(a, b).opcodes()
    }

    #[test]
    fn identical_sequences_are_one_equal_run() {
        let ops = opcodes(&["a", "b", "c"], &["a", "b", "c"]);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].tag, Tag::Equal);
        assert_eq!((ops[0].old_start, ops[0].old_end), (0, 3));
    }

    #[test]
    fn replace_is_a_single_opcode() {
        let ops = opcodes(&["a", "x", "c"], &["a", "y", "c"]);
        let tags: Vec<Tag> = ops.iter().map(|o| o.tag).collect();
        assert_eq!(tags, vec![Tag::Equal, Tag::Replace, Tag::Equal]);
    }

    #[test]
    fn classifies_insert_and_delete() {
        let ops = opcodes(&["a", "b"], &["a", "x", "b"]);
        assert!(ops.iter().any(|o| o.tag == Tag::Insert));

        let ops = opcodes(&["a", "x", "b"], &["a", "b"]);
        assert!(ops.iter().any(|o| o.tag == Tag::Delete));
    }

    #[test]
    fn opcodes_cover_both_sequences() {
        let a = ["1", "2", "3", "4", "5"];
        let b = ["1", "3", "4", "9", "5", "6"];
        let ops = opcodes(&a, &b);
        assert_eq!(ops.first().unwrap().old_start, 0);
        assert_eq!(ops.last().unwrap().old_end, a.len());
        assert_eq!(ops.last().unwrap().new_end, b.len());
        for pair in ops.windows(2) {
            assert_eq!(pair[0].old_end, pair[1].old_start);
            assert_eq!(pair[0].new_end, pair[1].new_start);
        }
    }

    #[test]
    fn grouped_opcodes_split_on_large_equal_runs() {
        let a: Vec<String> = (0..30).map(|i| i.to_string()).collect();
        let mut b = a.clone();
        b[2] = "two".to_string();
        b[27] = "niner".to_string();
        let a_refs: Vec<&str> = a.iter().map(String::as_str).collect();
        let b_refs: Vec<&str> = b.iter().map(String::as_str).collect();
        let groups = SequenceMatcher::new(&a_refs, &b_refs).grouped_opcodes(3);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn no_groups_for_identical_input() {
        let a = ["a", "b"];
        assert!(SequenceMatcher::new(&a, &a).grouped_opcodes(3).is_empty());
    }
}
