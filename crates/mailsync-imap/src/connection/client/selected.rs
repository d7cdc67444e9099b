//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::Selected;
use crate::Result;
use crate::command::{Command, FetchAttribute, SearchCriteria};
use crate::parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::{SeqNum, Uid, UidSet};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs UID SEARCH and returns matching UIDs in ascending order.
    pub async fn uid_search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>> {
        let responses = self
            .execute(&Command::UidSearch {
                criteria: criteria.clone(),
            })
            .await?;

        let mut uids: Vec<Uid> = responses
            .iter()
            .filter_map(|bytes| match ResponseParser::parse(bytes) {
                Ok(Response::Untagged(UntaggedResponse::Search(ids))) => Some(ids),
                _ => None,
            })
            .flatten()
            .filter_map(Uid::new)
            .collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Runs UID FETCH and returns the items of every FETCH response.
    ///
    /// An empty set sends nothing and returns nothing.
    pub async fn uid_fetch(
        &mut self,
        uids: &UidSet,
        attributes: &[FetchAttribute],
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let responses = self
            .execute(&Command::UidFetch {
                uids: uids.clone(),
                attributes: attributes.to_vec(),
            })
            .await?;

        Ok(responses
            .iter()
            .filter_map(|bytes| match ResponseParser::parse(bytes) {
                Ok(Response::Untagged(UntaggedResponse::Fetch { seq, items })) => {
                    Some((seq, items))
                }
                _ => None,
            })
            .collect())
    }
}
