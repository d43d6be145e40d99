//! Query and result types shared by every resource fetch.

/// One page of a collection resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedResult<T> {
  pub items: Vec<T>,
  /// 1-based page number reported by the server
  pub current_page: u32,
  pub total_page_count: u32,
}

impl<T> PagedResult<T> {
  /// Whether this page is the last one the server reports.
  pub fn is_last(&self) -> bool {
    self.current_page >= self.total_page_count
  }
}

/// A single item together with its concurrency token.
#[derive(Debug, Clone, PartialEq)]
pub struct Etagged<T> {
  pub item: T,
  pub etag: Option<String>,
}

/// A `field eq value` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
  pub field: String,
  pub value: String,
}

/// Query parameters for a collection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
  pub page_size: u32,
  pub page_number: u32,
  pub filters: Vec<Filter>,
  pub order_by: Vec<String>,
  pub fields: Vec<String>,
}

impl Default for ResourceQuery {
  fn default() -> Self {
    Self {
      page_size: 100,
      page_number: 1,
      filters: Vec::new(),
      order_by: Vec::new(),
      fields: Vec::new(),
    }
  }
}

impl ResourceQuery {
  pub fn new(page_size: u32) -> Self {
    Self {
      page_size,
      ..Self::default()
    }
  }

  pub fn filter(mut self, field: &str, value: impl ToString) -> Self {
    self.filters.push(Filter {
      field: field.to_string(),
      value: value.to_string(),
    });
    self
  }

  pub fn order_by(mut self, field: &str) -> Self {
    self.order_by.push(field.to_string());
    self
  }

  pub fn fields(mut self, fields: &[&str]) -> Self {
    self.fields.extend(fields.iter().map(|f| f.to_string()));
    self
  }

  /// Same query pointed at another page.
  pub fn page(&self, page_number: u32) -> Self {
    Self {
      page_number,
      ..self.clone()
    }
  }

  /// Render as query-string pairs. Filters, order-by and fields are
  /// comma-joined; empty parts are omitted.
  pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
      ("pageSize", self.page_size.to_string()),
      ("pageNumber", self.page_number.to_string()),
    ];

    if !self.filters.is_empty() {
      let filter = self
        .filters
        .iter()
        .map(|f| format!("{} eq {}", f.field, f.value))
        .collect::<Vec<_>>()
        .join(",");
      pairs.push(("filter", filter));
    }
    if !self.order_by.is_empty() {
      pairs.push(("orderBy", self.order_by.join(",")));
    }
    if !self.fields.is_empty() {
      pairs.push(("fields", self.fields.join(",")));
    }

    pairs
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_query_has_only_paging() {
    let pairs = ResourceQuery::new(50).to_pairs();
    assert_eq!(
      pairs,
      vec![
        ("pageSize", "50".to_string()),
        ("pageNumber", "1".to_string())
      ]
    );
  }

  #[test]
  fn test_filters_are_comma_joined() {
    let pairs = ResourceQuery::new(10)
      .filter("engagementId", 42)
      .filter("isActive", true)
      .to_pairs();
    assert!(pairs.contains(&("filter", "engagementId eq 42,isActive eq true".to_string())));
  }

  #[test]
  fn test_fields_and_order_by() {
    let pairs = ResourceQuery::new(10)
      .fields(&["id", "userObjectId"])
      .order_by("createdAt")
      .to_pairs();
    assert!(pairs.contains(&("fields", "id,userObjectId".to_string())));
    assert!(pairs.contains(&("orderBy", "createdAt".to_string())));
  }

  #[test]
  fn test_page_keeps_everything_else() {
    let query = ResourceQuery::new(10).filter("clientId", 7);
    let next = query.page(3);
    assert_eq!(next.page_number, 3);
    assert_eq!(next.filters, query.filters);
  }

  #[test]
  fn test_is_last() {
    let page: PagedResult<u8> = PagedResult {
      items: vec![],
      current_page: 2,
      total_page_count: 2,
    };
    assert!(page.is_last());
  }
}
