/// Line and column lookup over one source text. Lines end at `\n`, `\r\n`
/// or a lone `\r`, the same breaks the lexer accepts inside strings.
pub struct SourceMap<'src> {
    source: &'src str,
    /// Byte offset of the first character of each line.
    starts: Vec<usize>,
}

impl<'src> SourceMap<'src> {
    pub fn new(source: &'src str) -> Self {
        let bytes = source.as_bytes();
        let mut starts = vec![0];
        for (i, &b) in bytes.iter().enumerate() {
            match b {
                b'\n' => starts.push(i + 1),
                b'\r' if bytes.get(i + 1) != Some(&b'\n') => starts.push(i + 1),
                _ => {}
            }
        }
        SourceMap { source, starts }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// 1-based (line, column) of a byte offset. Columns count characters,
    /// so multi-byte text before the offset shifts it by one per character.
    /// Offsets past the end map to the end of the last line.
    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.source.len());
        let index = self.starts.partition_point(|&start| start <= offset) - 1;
        let start = self.starts[index];
        let column = self.source.get(start..offset).map_or(offset - start, |s| s.chars().count());
        (index + 1, column + 1)
    }

    /// Text of a 1-based line without its terminator; empty when out of range.
    pub fn line(&self, line: usize) -> &'src str {
        let Some(&start) = line.checked_sub(1).and_then(|i| self.starts.get(i)) else {
            return "";
        };
        let end = self.starts.get(line).copied().unwrap_or(self.source.len());
        self.source
            .get(start..end)
            .unwrap_or("")
            .trim_end_matches('\n')
            .trim_end_matches('\r')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line() {
        let map = SourceMap::new("print(\"hi\")");
        assert_eq!(map.lookup(0), (1, 1));
        assert_eq!(map.lookup(5), (1, 6));
        assert_eq!(map.lookup(11), (1, 12));
        assert_eq!(map.line_count(), 1);
    }

    #[test]
    fn later_lines() {
        let map = SourceMap::new("local a = 1\nlocal b = 2\nprint(a + b)");
        assert_eq!(map.lookup(11), (1, 12));
        assert_eq!(map.lookup(12), (2, 1));
        assert_eq!(map.lookup(24), (3, 1));
        assert_eq!(map.line(2), "local b = 2");
    }

    #[test]
    fn every_line_ending() {
        let map = SourceMap::new("x = 1\r\ny = 2\rz = 3\nprint(x)");
        assert_eq!(map.line_count(), 4);
        assert_eq!(map.line(1), "x = 1");
        assert_eq!(map.line(2), "y = 2");
        assert_eq!(map.line(3), "z = 3");
        assert_eq!(map.line(4), "print(x)");
        assert_eq!(map.lookup(7), (2, 1));
        assert_eq!(map.lookup(13), (3, 1));
    }

    #[test]
    fn columns_count_characters() {
        let src = "s = 'héllo' + 1";
        let map = SourceMap::new(src);
        let plus = src.find('+').unwrap();
        assert_eq!(map.lookup(plus), (1, 13));
    }

    #[test]
    fn out_of_range() {
        let map = SourceMap::new("print(1)");
        assert_eq!(map.line(0), "");
        assert_eq!(map.line(99), "");
        assert_eq!(map.lookup(500), (1, 9));
    }

    #[test]
    fn empty_and_trailing_newline() {
        let map = SourceMap::new("");
        assert_eq!(map.lookup(0), (1, 1));
        assert_eq!(map.line(1), "");

        let map = SourceMap::new("print(1)\n");
        assert_eq!(map.line(1), "print(1)");
        assert_eq!(map.line(2), "");
        assert_eq!(map.lookup(9), (2, 1));
    }
}
