use std::path::Path;

use tracing::info;

use crate::categorizer::{recalculate, RecalcResult};
use crate::error::{Result, VypiskaError};
use crate::models::{norm_spaces, norm_text, ReferenceMap};
use crate::statement::decode;
use crate::store::Store;

/// Metadata key recording where the current reference map came from.
pub const REFMAP_SOURCE_KEY: &str = "refmap_source";

const SNIFF_CHARS: usize = 4096;

fn insert_pair(map: &mut ReferenceMap, category: &str, counterparty: &str) {
    let key = norm_text(counterparty);
    let category = norm_spaces(category);
    if key.is_empty() || category.is_empty() {
        return;
    }
    map.insert(key, category);
}

fn sniff_delimiter(text: &str) -> u8 {
    let head = text.chars().take(SNIFF_CHARS);
    let (semicolons, commas) = head.fold((0usize, 0usize), |(s, c), ch| match ch {
        ';' => (s + 1, c),
        ',' => (s, c + 1),
        _ => (s, c),
    });
    if semicolons >= commas {
        b';'
    } else {
        b','
    }
}

/// Column 0 is the category, column 1 the counterparty fragment. First row is a header.
pub fn parse_csv(data: &[u8]) -> Result<ReferenceMap> {
    let text = decode(data);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(&text))
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut map = ReferenceMap::new();
    for record in reader.records() {
        let record = record?;
        if let (Some(category), Some(counterparty)) = (record.get(0), record.get(1)) {
            insert_pair(&mut map, category, counterparty);
        }
    }
    Ok(map)
}

#[cfg(feature = "xlsx")]
fn parse_xlsx(path: &Path) -> Result<ReferenceMap> {
    use calamine::Reader;

    fn cell_text(cell: &calamine::Data) -> String {
        match cell {
            calamine::Data::String(s) => s.clone(),
            calamine::Data::Float(f) => f.to_string(),
            calamine::Data::Int(i) => i.to_string(),
            _ => String::new(),
        }
    }

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| VypiskaError::MapRead(format!("failed to open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| VypiskaError::MapRead("workbook has no sheets".to_string()))?
        .map_err(|e| VypiskaError::MapRead(e.to_string()))?;

    let mut map = ReferenceMap::new();
    for row in range.rows().skip(1) {
        if row.len() < 2 {
            continue;
        }
        insert_pair(&mut map, &cell_text(&row[0]), &cell_text(&row[1]));
    }
    Ok(map)
}

pub fn load_reference_map(path: &Path) -> Result<ReferenceMap> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => parse_csv(&std::fs::read(path)?),
        #[cfg(feature = "xlsx")]
        "xlsx" | "xls" => parse_xlsx(path),
        _ => Err(VypiskaError::UnsupportedMapFormat(ext)),
    }
}

pub struct RefmapImport {
    pub entries: usize,
    pub recalc: RecalcResult,
}

/// Replace the stored reference map with the one in `path` and recalculate.
/// Nothing is written when the file cannot be read.
pub fn import_reference_map<S: Store>(store: &S, path: &Path) -> Result<RefmapImport> {
    let map = load_reference_map(path)?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    store.exclusive(|s| {
        s.replace_reference_map(&map)?;
        s.set_metadata(REFMAP_SOURCE_KEY, &source)?;
        let recalc = recalculate(s)?;
        info!(source = %source, entries = map.len(), "loaded reference map");
        Ok(RefmapImport {
            entries: map.len(),
            recalc,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{sample_txn, test_store};
    use encoding_rs::WINDOWS_1251;

    #[test]
    fn test_parse_csv_semicolon_cp1251() {
        let text = "Статья;Контрагент\nАренда;ООО  Ромашка\n  Услуги  связи ;ПАО Провайдер\n;Пусто\n";
        let (bytes, _, _) = WINDOWS_1251.encode(text);
        let map = parse_csv(&bytes).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["ООО РОМАШКА"], "Аренда");
        assert_eq!(map["ПАО ПРОВАЙДЕР"], "Услуги связи");
    }

    #[test]
    fn test_parse_csv_comma() {
        let map = parse_csv("category,counterparty\nАренда,Ромашка\nУслуги,Ромашка\n".as_bytes()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["РОМАШКА"], "Услуги");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            load_reference_map(&path),
            Err(VypiskaError::UnsupportedMapFormat(ext)) if ext == "json"
        ));
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_load_xlsx_skips_header_and_reads_numbers() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/refmap.xlsx");
        let map = load_reference_map(&path).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["ООО РОМАШКА"], "Аренда");
        assert_eq!(map["7701234567"], "Связь");
        assert!(!map.contains_key("КОНТРАГЕНТ"));
    }

    #[test]
    fn test_import_replaces_and_recalculates() {
        let (dir, store) = test_store();
        let txn = sample_txn("ООО Ромашка", "Оплата");
        store.insert_transaction(&txn).unwrap();

        let first = dir.path().join("first.csv");
        std::fs::write(&first, "Статья;Контрагент\nАренда;Ромашка\nУслуги;Вектор\n").unwrap();
        let result = import_reference_map(&store, &first).unwrap();
        assert_eq!(result.entries, 2);
        assert_eq!(store.get_transaction(&txn.id).unwrap().unwrap().category_label(), "Аренда");

        let second = dir.path().join("second.csv");
        std::fs::write(&second, "Статья;Контрагент\nСвязь;Вектор\n").unwrap();
        import_reference_map(&store, &second).unwrap();
        assert_eq!(store.reference_map().unwrap().len(), 1);
        assert_eq!(store.metadata(REFMAP_SOURCE_KEY).unwrap().as_deref(), Some("second.csv"));
        assert_eq!(store.get_transaction(&txn.id).unwrap().unwrap().category_label(), "Прочее");
    }

    #[test]
    fn test_failed_load_keeps_previous_map() {
        let (dir, store) = test_store();
        let good = dir.path().join("good.csv");
        std::fs::write(&good, "Статья;Контрагент\nАренда;Ромашка\n").unwrap();
        import_reference_map(&store, &good).unwrap();
        assert!(import_reference_map(&store, &dir.path().join("bad.txt")).is_err());
        assert_eq!(store.reference_map().unwrap().len(), 1);
    }
}
