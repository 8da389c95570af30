#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Datelike;

    use crate::tests::support::{test_app, SeedBook, TestApp};

    /// Two authors, eight books. Books 1..=7 have covers, book 8 has none.
    async fn seed_library(t: &TestApp) -> (i64, i64) {
        let herbert = t.seed_author("Frank Herbert", "Wrote about sand").await;
        let asimov = t.seed_author("Isaac Asimov", "Robots and empires").await;
        let books = [
            ("Dune", "Spice and sandworms", herbert, Some(1965)),
            ("Dune Messiah", "The emperor years", herbert, Some(1969)),
            ("Foundation", "Psychohistory", asimov, Some(1951)),
            ("I, Robot", "Three laws", asimov, Some(1950)),
            ("The Caves of Steel", "A detective story", asimov, Some(1954)),
            ("Children of Dune", "Twins", herbert, Some(1976)),
            ("The End of Eternity", "Time travel", asimov, None),
            ("Untitled Draft", "No cover yet", herbert, Some(1980)),
        ];
        for (i, (title, description, author_id, year)) in books.iter().enumerate() {
            let seq = (i + 1) as u32;
            let cover = format!("/uploads/books/cover-{}.jpg", seq);
            t.seed_book(SeedBook {
                title,
                description,
                author_id: *author_id,
                year: *year,
                cover: if seq <= 7 { Some(cover.as_str()) } else { None },
                seq,
                ..Default::default()
            })
            .await;
        }
        (herbert, asimov)
    }

    #[tokio::test]
    async fn test_carousel_returns_newest_covers() {
        let t = test_app().await;

        let (status, body) = t.get("/bookclub/carousel").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
        assert_eq!(body["message"], "No books with cover images found");

        seed_library(&t).await;
        let (status, body) = t.get("/bookclub/carousel").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 6);
        assert_eq!(body["message"], "Found 6 books with cover images");
        let titles: Vec<&str> = body["data"].as_array().unwrap().iter().map(|b| b["title"].as_str().unwrap()).collect();
        // Book 8 has no cover; book 1 is the oldest of the seven covered ones
        assert_eq!(titles[0], "The End of Eternity");
        assert!(!titles.contains(&"Untitled Draft"));
        assert!(!titles.contains(&"Dune"));
        assert!(body["data"][0]["author"]["name"].is_string());
    }

    #[tokio::test]
    async fn test_recommended_is_a_covered_sample() {
        let t = test_app().await;
        seed_library(&t).await;

        for _ in 0..5 {
            let (status, body) = t.get("/bookclub/recommended").await;
            assert_eq!(status, StatusCode::OK);
            let data = body["data"].as_array().unwrap();
            assert_eq!(data.len(), 6);
            assert_eq!(body["message"], "Found 6 recommended books");
            assert!(data.iter().all(|b| b["coverImage"].is_string()));
            let mut ids: Vec<i64> = data.iter().map(|b| b["id"].as_i64().unwrap()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), 6);
        }
    }

    #[tokio::test]
    async fn test_search_rejects_short_queries() {
        let t = test_app().await;
        for uri in ["/bookclub/search?q=a", "/bookclub/search?q=%20%20", "/bookclub/search"] {
            let (status, body) = t.get(uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"]["message"], "Search query must be at least 2 characters long");
        }
    }

    #[tokio::test]
    async fn test_search_ranks_title_matches_first() {
        let t = test_app().await;
        seed_library(&t).await;

        let (status, body) = t.get("/bookclub/search?q=dune&type=book").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "dune");
        assert_eq!(body["type"], "book");
        let hits = body["data"].as_array().unwrap();
        assert_eq!(body["count"], 3);
        assert!(hits.iter().all(|h| h["type"] == "book" && h["category"] == "Book"));
        assert_eq!(hits[0]["title"], "Dune");
        assert_eq!(hits[0]["author"], "Frank Herbert");
        assert_eq!(hits[0]["publishedYear"], 1965);
    }

    #[tokio::test]
    async fn test_search_matches_authors_and_descriptions() {
        let t = test_app().await;
        seed_library(&t).await;

        let (_, body) = t.get("/bookclub/search?q=sand").await;
        let hits = body["data"].as_array().unwrap();
        // "Spice and sandworms" (book description) and "Wrote about sand" (author bio)
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|h| h["type"] == "author" && h["title"] == "Frank Herbert"));
        assert!(hits.iter().any(|h| h["type"] == "book" && h["title"] == "Dune"));
        let author_hit = hits.iter().find(|h| h["type"] == "author").unwrap();
        assert!(author_hit.get("publishedYear").is_none());

        let (_, body) = t.get("/bookclub/search?q=asimov&type=author").await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["category"], "Author");
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally_and_limits() {
        let t = test_app().await;
        seed_library(&t).await;

        let (_, body) = t.get("/bookclub/search?q=%25%25").await;
        assert_eq!(body["count"], 0);

        let (_, body) = t.get("/bookclub/search?q=the&type=book&limit=2").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (status, _) = t.get("/bookclub/search?q=the&limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(t.state.metrics.get_snapshot().searches, 2);
    }

    #[tokio::test]
    async fn test_books_by_author_filters_and_sorts() {
        let t = test_app().await;
        let (herbert, asimov) = seed_library(&t).await;

        let (status, body) = t.get(&format!("/bookclub/booksbyauthor?author={}&sort=title_asc", herbert)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalBooks"], 4);
        let titles: Vec<&str> = body["data"].as_array().unwrap().iter().map(|b| b["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["Children of Dune", "Dune", "Dune Messiah", "Untitled Draft"]);
        assert_eq!(body["filters"]["authorId"], herbert.to_string());
        assert_eq!(body["filters"]["sort"], "title_asc");

        let (_, body) = t.get(&format!("/bookclub/booksbyauthor?author={}&year=1951", asimov)).await;
        assert_eq!(body["totalBooks"], 1);
        assert_eq!(body["data"][0]["title"], "Foundation");

        let (_, body) = t.get("/bookclub/booksbyauthor?author=all&year=all&search=robot").await;
        assert_eq!(body["totalBooks"], 1);
        assert_eq!(body["data"][0]["title"], "I, Robot");

        // Search also matches the author name
        let (_, body) = t.get("/bookclub/booksbyauthor?search=herbert").await;
        assert_eq!(body["totalBooks"], 4);
    }

    #[tokio::test]
    async fn test_books_by_author_paginates_newest_first() {
        let t = test_app().await;
        seed_library(&t).await;

        let (status, body) = t.get("/bookclub/booksbyauthor?page=2&limit=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 2);
        assert_eq!(body["totalBooks"], 8);
        assert_eq!(body["totalPages"], 3);
        assert_eq!(body["filters"]["sort"], "newest");
        let titles: Vec<&str> = body["data"].as_array().unwrap().iter().map(|b| b["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["The Caves of Steel", "I, Robot", "Foundation"]);

        let (status, body) = t.get("/bookclub/booksbyauthor?author=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "author");
    }

    #[tokio::test]
    async fn test_books_by_author_unknown_sort_is_newest() {
        let t = test_app().await;
        seed_library(&t).await;

        let (status, body) = t.get("/bookclub/booksbyauthor?sort=random&limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filters"]["sort"], "newest");
        let titles: Vec<&str> = body["data"].as_array().unwrap().iter().map(|b| b["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["Untitled Draft", "The End of Eternity"]);
    }

    #[tokio::test]
    async fn test_malformed_query_strings_use_error_envelope() {
        let t = test_app().await;
        for uri in ["/bookclub/booksbyauthor?page=abc", "/bookclub/search?q=dune&type=xyz", "/books?limit=ten"] {
            let (status, body) = t.get(uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"]["code"], "BAD_REQUEST", "{}", uri);
            assert_eq!(body["status"], 400);
            assert!(body["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let t = test_app().await;
        let zola = t.seed_author("Émile Zola", "Naturaliste").await;
        t.seed_book(SeedBook { title: "L'Œuvre", description: "ÉTÉ à Paris", author_id: zola, seq: 1, ..Default::default() })
            .await;

        for q in ["émile", "Émile", "ÉMILE"] {
            let (status, body) = t.get(&format!("/bookclub/search?q={}&type=author", urlencode(q))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["count"], 1, "{}", q);
        }

        let (_, body) = t.get(&format!("/bookclub/search?q={}&type=book", urlencode("œuvre"))).await;
        assert_eq!(body["count"], 1);
        let (_, body) = t.get(&format!("/bookclub/search?q={}&type=book", urlencode("été"))).await;
        assert_eq!(body["count"], 1);

        let (_, body) = t.get(&format!("/bookclub/booksbyauthor?search={}", urlencode("zola"))).await;
        assert_eq!(body["totalBooks"], 1);
        let (_, body) = t.get(&format!("/bookclub/booksbyauthor?search={}", urlencode("ÉMILE"))).await;
        assert_eq!(body["totalBooks"], 1);
    }

    #[tokio::test]
    async fn test_search_sees_renamed_author() {
        let t = test_app().await;
        let (_, author) = t.json(axum::http::Method::POST, "/authors", serde_json::json!({ "name": "Anon" })).await;
        let id = author["id"].as_i64().unwrap();
        t.json(axum::http::Method::PUT, &format!("/authors/{}", id), serde_json::json!({ "name": "Ōe Kenzaburō" }))
            .await;

        let (_, body) = t.get(&format!("/bookclub/search?q={}", urlencode("ōe"))).await;
        assert_eq!(body["count"], 1);
        let (_, body) = t.get("/bookclub/search?q=anon").await;
        assert_eq!(body["count"], 0);
    }

    /// Percent-encodes every byte outside unreserved ASCII.
    fn urlencode(value: &str) -> String {
        value
            .bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
                _ => format!("%{:02X}", b),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_dashboard_stats() {
        let t = test_app().await;
        let a = t.seed_author("One", "").await;
        t.seed_author("Two", "").await;
        let this_year = i64::from(chrono::Utc::now().year());
        t.seed_book(SeedBook { title: "Old", author_id: a, year: Some(1900), seq: 1, ..Default::default() }).await;
        t.seed_book(SeedBook { title: "New", author_id: a, year: Some(this_year), seq: 2, ..Default::default() })
            .await;
        t.seed_book(SeedBook { title: "Undated", author_id: a, seq: 3, ..Default::default() }).await;

        let (status, body) = t.get("/dashboard/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalBooks"], 3);
        assert_eq!(body["totalAuthors"], 2);
        assert_eq!(body["booksThisYear"], 1);
        assert_eq!(body["libraryCollection"], 5);
        let last_updated = body["lastUpdated"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(last_updated).is_ok());
    }
}
