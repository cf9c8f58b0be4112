use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::Result;
use crate::models::{norm_category, norm_text, Category, ReferenceMap, UserMap, DEFAULT_CATEGORY};
use crate::store::{Store, TransactionField};

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Counterparty fragments with a fixed category, checked in order.
const FIXED_MAP: &[(&str, &str)] = &[
    ("ООО РВБ", "РВБ"),
    ("ООО \"РВБ\"", "РВБ"),
    ("ФНС", "Налоги"),
    ("СКБ КОНТУР", "Консультационные услуги"),
    ("КОНТУР", "Консультационные услуги"),
];

/// Purpose keywords, checked in order against the upper-cased purpose.
const PURPOSE_KEYWORDS: &[(&[&str], &str)] = &[
    (&["КОМИСС", "ОБСЛУЖ", "ТАРИФ"], "Комиссия банка"),
    (&["АРЕНД"], "Аренда"),
    (&["НАЛОГ", "ЕНП", "КБК"], "Налоги"),
    (&["ЗАРПЛАТ", "ЗАРАБОТН"], "Зарплата"),
    (&["ИНТЕРНЕТ", "СВЯЗ"], "Связь, интернет"),
];

const TAX_SUBTYPES: &[(&[&str], &str)] = &[
    (&["УСН", "УПРОЩЕН"], "Налоги - УСН"),
    (&["НДС"], "Налоги - НДС"),
    (&["НДФЛ"], "Налоги - НДФЛ"),
    (&["СТРАХОВ"], "Налоги - Страховые"),
    (&["ЕНП"], "Налоги - ЕНП"),
];

const MARKETPLACE_NAME: &str = "ИНТЕРНЕТ РЕШЕНИЯ";
const MARKETPLACE_PRODUCTION_CODE: &str = "0216761417";

/// Longest key contained in `name` wins; equal lengths fall back to key order.
pub fn best_match<'a, V>(name: &str, map: &'a BTreeMap<String, V>) -> Option<(&'a str, &'a V)> {
    let name = norm_text(name);
    if name.is_empty() {
        return None;
    }
    let mut keys: Vec<&String> = map.keys().filter(|k| !k.is_empty()).collect();
    keys.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    keys.into_iter()
        .find(|k| name.contains(k.as_str()))
        .and_then(|k| map.get_key_value(k))
        .map(|(k, v)| (k.as_str(), v))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn is_treasury(counterparty: &str) -> bool {
    let lowered = counterparty.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped.contains("казначейство") && stripped.contains("фнс")
}

fn tax_subtype(purpose_upper: &str) -> &'static str {
    TAX_SUBTYPES
        .iter()
        .find(|(needles, _)| contains_any(purpose_upper, needles))
        .map_or("Налоги", |(_, category)| *category)
}

fn heuristic(counterparty: &str, purpose: &str) -> Option<&'static str> {
    let cp = norm_text(counterparty);
    let purpose_upper = purpose.to_uppercase();

    if is_treasury(counterparty) {
        return Some(tax_subtype(&purpose_upper));
    }

    let compact: String = cp.chars().filter(|c| !c.is_whitespace()).collect();
    if cp.contains(MARKETPLACE_NAME) || compact.contains("ИНТЕРНЕТРЕШЕНИЯ") {
        return Some(if purpose.contains(MARKETPLACE_PRODUCTION_CODE) {
            "Озон производство"
        } else {
            "Озон"
        });
    }

    if let Some((_, category)) = FIXED_MAP.iter().find(|(k, _)| cp.contains(&norm_text(k))) {
        return Some(*category);
    }

    PURPOSE_KEYWORDS
        .iter()
        .find(|(needles, _)| contains_any(&purpose_upper, needles))
        .map(|(_, category)| *category)
}

/// Resolve a category for one movement. Pure: same inputs, same answer.
///
/// Order: user overrides, reference map, built-in heuristics, then the default.
/// A user key holding two or more categories yields [`Category::Disputed`].
pub fn classify(
    counterparty: &str,
    purpose: &str,
    reference: &ReferenceMap,
    user: &UserMap,
) -> Category {
    if let Some((_, categories)) = best_match(counterparty, user) {
        match categories.as_slice() {
            [] => {}
            [only] => return Category::Assigned(norm_category(only)),
            _ => return Category::Disputed,
        }
    }

    if let Some((_, category)) = best_match(counterparty, reference) {
        return Category::Assigned(norm_category(category));
    }

    Category::Assigned(heuristic(counterparty, purpose).unwrap_or(DEFAULT_CATEGORY).to_string())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecalcResult {
    pub total: usize,
    pub changed: usize,
    pub disputed: usize,
}

/// Re-classify every stored transaction against the current maps.
pub fn recalculate<S: Store>(store: &S) -> Result<RecalcResult> {
    store.exclusive(|s| {
        let reference = s.reference_map()?;
        let user = s.user_map()?;
        let mut result = RecalcResult::default();

        for txn in s.list_transactions()? {
            result.total += 1;
            let category = classify(&txn.counterparty, &txn.purpose, &reference, &user);
            if category.is_disputed() {
                result.disputed += 1;
            }
            if txn.category.as_ref() != Some(&category) {
                s.update_transaction(&txn.id, TransactionField::Category(Some(category)))?;
                result.changed += 1;
            }
        }

        info!(
            total = result.total,
            changed = result.changed,
            disputed = result.disputed,
            "recalculated categories"
        );
        Ok(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{sample_txn, test_store};

    fn assigned(s: &str) -> Category {
        Category::Assigned(s.to_string())
    }

    fn refmap(pairs: &[(&str, &str)]) -> ReferenceMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn usermap(pairs: &[(&str, &[&str])]) -> UserMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|c| c.to_string()).collect()))
            .collect()
    }

    fn plain(cp: &str, purpose: &str) -> Category {
        classify(cp, purpose, &ReferenceMap::new(), &UserMap::new())
    }

    #[test]
    fn test_user_map_beats_reference_map() {
        let reference = refmap(&[("РОМАШКА", "Аренда")]);
        let user = usermap(&[("РОМАШКА", &["Услуги"])]);
        assert_eq!(classify("ООО Ромашка", "", &reference, &user), assigned("Услуги"));
    }

    #[test]
    fn test_two_user_categories_disputed() {
        let user = usermap(&[("РОМАШКА", &["Услуги", "Аренда"])]);
        assert_eq!(
            classify("ООО Ромашка", "", &ReferenceMap::new(), &user),
            Category::Disputed
        );
    }

    #[test]
    fn test_longest_key_wins() {
        let reference = refmap(&[("РОМАШКА", "Аренда"), ("РОМАШКА ПЛЮС", "Услуги")]);
        assert_eq!(
            classify("ООО Ромашка Плюс", "", &reference, &UserMap::new()),
            assigned("Услуги")
        );
        assert_eq!(classify("ООО Ромашка", "", &reference, &UserMap::new()), assigned("Аренда"));
    }

    #[test]
    fn test_equal_length_keys_are_deterministic() {
        let reference = refmap(&[("АБВ", "Первая"), ("БВГ", "Вторая")]);
        assert_eq!(classify("АБВГ", "", &reference, &UserMap::new()), assigned("Первая"));
    }

    #[test]
    fn test_mapped_category_normalized() {
        let reference = refmap(&[("РОМАШКА", "  Аренда   офиса ")]);
        assert_eq!(
            classify("Ромашка", "", &reference, &UserMap::new()),
            assigned("Аренда офиса")
        );
        let blank = refmap(&[("РОМАШКА", "  ")]);
        assert_eq!(classify("Ромашка", "", &blank, &UserMap::new()), assigned(DEFAULT_CATEGORY));
    }

    #[test]
    fn test_treasury_tax_subtypes() {
        let cp = "УФК по г. Москве (Казначейство, ФНС России)";
        assert_eq!(plain(cp, "Налог по УСН за 2023"), assigned("Налоги - УСН"));
        assert_eq!(plain(cp, "НДФЛ за январь"), assigned("Налоги - НДФЛ"));
        assert_eq!(plain(cp, "Страховые взносы"), assigned("Налоги - Страховые"));
        assert_eq!(plain(cp, "Единый налоговый платеж ЕНП"), assigned("Налоги - ЕНП"));
        assert_eq!(plain(cp, "Платеж"), assigned("Налоги"));
    }

    #[test]
    fn test_marketplace_production_code() {
        let cp = "ООО \"Интернет Решения\"";
        assert_eq!(plain(cp, "Выплата по договору 0216761417"), assigned("Озон производство"));
        assert_eq!(plain(cp, "Выплата"), assigned("Озон"));
        assert_eq!(plain("ООО ИНТЕРНЕТРЕШЕНИЯ", "Выплата"), assigned("Озон"));
    }

    #[test]
    fn test_fixed_counterparties() {
        assert_eq!(plain("ООО РВБ", ""), assigned("РВБ"));
        assert_eq!(plain("АО \"ПФ \"СКБ Контур\"", ""), assigned("Консультационные услуги"));
    }

    #[test]
    fn test_purpose_keywords() {
        assert_eq!(plain("ПАО Банк", "Комиссия за ведение счета"), assigned("Комиссия банка"));
        assert_eq!(plain("ИП Иванов", "Арендная плата за май"), assigned("Аренда"));
        assert_eq!(plain("ИП Иванов", "Заработная плата"), assigned("Зарплата"));
        assert_eq!(plain("ООО Провайдер", "Услуги связи"), assigned("Связь, интернет"));
        assert_eq!(plain("ИП Иванов", "Оплата по счету 5"), assigned(DEFAULT_CATEGORY));
    }

    #[test]
    fn test_classify_is_pure() {
        let reference = refmap(&[("РОМАШКА", "Аренда")]);
        let user = usermap(&[("ВЕКТОР", &["Услуги"])]);
        let a = classify("ООО Вектор", "Комиссия", &reference, &user);
        let b = classify("ООО Вектор", "Комиссия", &reference, &user);
        assert_eq!(a, b);
    }

    #[test]
    fn test_recalculate_is_idempotent() {
        let (_dir, store) = test_store();
        store.insert_transaction(&sample_txn("ООО Ромашка", "Аренда офиса")).unwrap();
        store.insert_transaction(&sample_txn("ПАО Банк", "Комиссия")).unwrap();
        let first = recalculate(&store).unwrap();
        assert_eq!(first.total, 2);
        assert_eq!(first.changed, 2);
        let before = store.list_transactions().unwrap();
        let second = recalculate(&store).unwrap();
        assert_eq!(second.changed, 0);
        assert_eq!(store.list_transactions().unwrap(), before);
    }

    #[test]
    fn test_recalculate_marks_disputed() {
        let (_dir, store) = test_store();
        store.insert_transaction(&sample_txn("ООО Ромашка", "")).unwrap();
        store.insert_transaction(&sample_txn("ООО Ромашка", "другое")).unwrap();
        store.add_user_category("РОМАШКА", "Аренда").unwrap();
        store.add_user_category("РОМАШКА", "Услуги").unwrap();
        let result = recalculate(&store).unwrap();
        assert_eq!(result.disputed, 2);
        assert!(store.list_transactions().unwrap().iter().all(|t| t.is_disputed()));
    }
}
