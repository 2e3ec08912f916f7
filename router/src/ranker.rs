/// BM25 document ranking
use open_qa_core::retriever::{RankedDocument, Ranker, RankerError};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, Searcher, TantivyDocument};

const WRITER_MEMORY: usize = 50_000_000;

/// In memory BM25 index over the corpus
pub struct Bm25Ranker {
    reader: IndexReader,
    query_parser: QueryParser,
    id_field: Field,
}

impl Bm25Ranker {
    pub fn new<'a, I>(documents: I) -> tantivy::Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut index_writer: IndexWriter = index.writer(WRITER_MEMORY)?;
        let mut indexed = 0;
        for (id, text) in documents {
            index_writer.add_document(doc!(
                id_field => id,
                text_field => text,
            ))?;
            indexed += 1;
        }
        index_writer.commit()?;
        tracing::info!("Indexed {indexed} documents");

        let reader = index.reader()?;
        let query_parser = QueryParser::for_index(&index, vec![text_field]);

        Ok(Self {
            reader,
            query_parser,
            id_field,
        })
    }

    fn search(
        &self,
        searcher: &Searcher,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedDocument>, RankerError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // Questions are free text, unparsable fragments are dropped
        let (query, errors) = self.query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!("Ignored {} query fragments", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(k))
            .map_err(|err| RankerError::Unavailable(err.to_string()))?;

        top_docs
            .into_iter()
            .map(|(score, address)| {
                let document: TantivyDocument = searcher
                    .doc(address)
                    .map_err(|err| RankerError::Unavailable(err.to_string()))?;
                let doc_id = document
                    .get_first(self.id_field)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| RankerError::Malformed("document without id".to_string()))?;
                Ok(RankedDocument::new(doc_id, score))
            })
            .collect()
    }
}

impl Ranker for Bm25Ranker {
    fn rank(&self, query: &str, k: usize) -> Result<Vec<RankedDocument>, RankerError> {
        self.search(&self.reader.searcher(), query, k)
    }

    fn rank_batch(
        &self,
        queries: &[String],
        k: usize,
    ) -> Result<Vec<Vec<RankedDocument>>, RankerError> {
        let searcher = self.reader.searcher();
        queries
            .iter()
            .map(|query| self.search(&searcher, query, k))
            .collect()
    }
}
