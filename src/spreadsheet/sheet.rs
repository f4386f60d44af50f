use crate::spreadsheet::cell::Cell;

/// The first worksheet of a workbook: its non-empty cells in row-major order
/// plus the bounds of the area they occupy.
pub(crate) struct Sheet {
    /// Sheet name
    pub(crate) name: String,
    /// Non-empty cells, sorted by (row, col) once finished
    pub(crate) cells: Vec<Cell>,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(super) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Adds a cell to the sheet, updating the data range.
    pub(super) fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        self.cells.push(cell);
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|row_lower_bound| row < row_lower_bound).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|col_lower_bound| col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Puts the cells in row-major order. Worksheet parts are written in order,
    /// but nothing in either format forbids otherwise.
    pub(super) fn finish(&mut self) {
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
        self.cells.dedup_by_key(|cell| (cell.row, cell.col));
    }

    /// Lays out rows `row_lower..=row_upper_bound` over columns `col_lower..=col_upper`
    /// as a table of optional cell references. Requires `finish` to have run.
    pub(crate) fn table(&self, row_lower: usize, col_lower: usize, col_upper: usize) -> Vec<Vec<Option<&Cell>>> {
        let Some(row_upper) = self.row_upper_bound else {
            return Vec::new();
        };
        let mut index = self.cells.partition_point(|cell| cell.row < row_lower);
        let mut table = Vec::<Vec<Option<&Cell>>>::new();
        for row in row_lower..=row_upper {
            let mut record = Vec::<Option<&Cell>>::with_capacity(col_upper + 1 - col_lower);
            while index < self.cells.len() && self.cells[index].row == row && self.cells[index].col < col_lower {
                index += 1;
            }
            for col in col_lower..=col_upper {
                match self.cells.get(index) {
                    Some(cell) if cell.row == row && cell.col == col => {
                        record.push(Some(cell));
                        index += 1;
                    }
                    _ => record.push(None),
                }
            }
            while index < self.cells.len() && self.cells[index].row == row {
                index += 1;
            }
            table.push(record);
        }
        table
    }
}
