// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mailbridge::imap::types::{compact_uid_set, uid_set_chunks, SearchCriteria, SortOrder, MAX_IDS_PER_COMMAND};

    #[test]
    fn test_empty_criteria_matches_all() {
        assert_eq!(SearchCriteria::default().to_query().unwrap(), "ALL");
    }

    #[test]
    fn test_criteria_query() {
        let criteria = SearchCriteria {
            since: NaiveDate::from_ymd_opt(2024, 3, 5),
            subject: Some("quarterly \"report\"".into()),
            from: Some(String::new()),
            seen: Some(false),
            flagged: Some(true),
            ..SearchCriteria::default()
        };
        assert_eq!(
            criteria.to_query().unwrap(),
            "SINCE 05-MAR-2024 SUBJECT \"quarterly \\\"report\\\"\" UNSEEN FLAGGED"
        );
    }

    #[test]
    fn test_uid_sets_are_chunked() {
        let ids: Vec<u32> = (1..=(MAX_IDS_PER_COMMAND as u32 * 2 + 3)).collect();
        let chunks = uid_set_chunks(&ids);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], format!("1:{}", MAX_IDS_PER_COMMAND));
        assert_eq!(compact_uid_set(&[3, 1, 2, 8]), "1:3,8");
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert_eq!(SortOrder::default(), SortOrder::Desc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
