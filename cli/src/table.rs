use std::fmt::{self, Write};

const PADDING: usize = 3;

/// Renders rows as left-aligned, padded columns.
pub struct Table<'a, T> {
    cols: Vec<Column<T>>,
    rows: &'a [T],
}

struct Column<T> {
    header: &'static str,
    value: fn(&T) -> String,
}

impl<'a, T> Table<'a, T> {
    pub fn new(rows: &'a [T]) -> Self {
        Self {
            cols: Vec::new(),
            rows,
        }
    }

    pub fn column(mut self, header: &'static str, value: fn(&T) -> String) -> Self {
        self.cols.push(Column { header, value });
        self
    }
}

impl<T> fmt::Display for Table<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self
            .rows
            .iter()
            .map(|row| self.cols.iter().map(|col| (col.value)(row)).collect())
            .collect::<Vec<Vec<String>>>();
        let widths = self
            .cols
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let widest = cells.iter().map(|row| row[i].len()).max().unwrap_or(0);
                col.header.len().max(widest) + PADDING
            })
            .collect::<Vec<_>>();

        for (col, width) in self.cols.iter().zip(&widths) {
            write!(f, "{:width$}", col.header, width = width)?;
        }
        f.write_char('\n')?;
        for row in &cells {
            for (cell, width) in row.iter().zip(&widths) {
                write!(f, "{:width$}", cell, width = width)?;
            }
            f.write_char('\n')?;
        }
        Ok(())
    }
}
